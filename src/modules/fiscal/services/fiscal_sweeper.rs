use std::sync::Arc;
use std::time::Duration;

use tokio::time::interval;
use tracing::{error, info, warn};

use super::fiscal_service::FiscalService;
use crate::core::{AppError, Result};
use crate::modules::fiscal::models::FiscalStatus;
use crate::modules::invoices::repositories::InvoiceRepository;

const BATCH_SIZE: i64 = 100;

/// Optional background job advancing `created` documents to `validated`
///
/// Invoice reads do the same thing lazily; this only shortens the time a
/// document sits in `created` when nobody looks at it.
pub struct FiscalSweeper {
    fiscal: Arc<FiscalService>,
    invoice_repo: Arc<dyn InvoiceRepository>,
    period: Duration,
}

impl FiscalSweeper {
    pub fn new(
        fiscal: Arc<FiscalService>,
        invoice_repo: Arc<dyn InvoiceRepository>,
        period: Duration,
    ) -> Self {
        Self {
            fiscal,
            invoice_repo,
            period,
        }
    }

    /// Run forever; spawn as a tokio task
    pub async fn start(self: Arc<Self>) {
        info!(period_secs = self.period.as_secs(), "Starting fiscal sweeper");

        let mut ticker = interval(self.period);

        loop {
            ticker.tick().await;

            match self.sweep().await {
                Ok(validated) => {
                    if validated > 0 {
                        info!(validated = validated, "Fiscal sweep advanced documents");
                    }
                }
                Err(e) => {
                    error!(error = %e, "Fiscal sweep failed");
                }
            }
        }
    }

    /// One pass over the backlog. Returns how many documents were validated.
    pub async fn sweep(&self) -> Result<usize> {
        let backlog = self
            .invoice_repo
            .find_with_fiscal_status(FiscalStatus::Created, BATCH_SIZE)
            .await?;

        let mut validated = 0;
        for invoice in backlog {
            match self.fiscal.ensure_validated(&invoice).await {
                Ok(updated) if updated.fiscal_status() == Some(FiscalStatus::Validated) => {
                    validated += 1;
                }
                Ok(_) => {}
                Err(e) => {
                    warn!(
                        invoice_id = %invoice.id,
                        error = %e,
                        kind = e.kind(),
                        "Fiscal validation deferred"
                    );
                    // Credentials will not fix themselves within this pass
                    if matches!(e, AppError::Configuration(_)) {
                        break;
                    }
                }
            }
        }

        Ok(validated)
    }
}
