//! Single-customer generation outside the queue.
//!
//! `run_one` generates and holds the result; `save_one` persists it. Neither touches the
//! checkpoint, and both are refused while a job is active.

use super::controller::{JobController, ManualSlot};
use super::{CustomerResult, CustomerStatus};
use crate::error::EngineError;
use crate::flags::compute_flags;
use crate::types::{CustomerDescriptor, CustomerId};
use tracing::{info, warn};

impl JobController {
    pub(super) async fn run_one(
        &mut self,
        customer_id: CustomerId,
    ) -> Result<CustomerResult, EngineError> {
        let customer = self.find_customer(&customer_id).await?;
        let period = self.job.period.clone();
        let flags = compute_flags(&customer.id);
        info!(
            customer_id = %customer.id,
            period = %period,
            client = self.deps.generator.client_name(),
            sections = flags.requested_sections().len(),
            "manual generation started"
        );

        let mut result = CustomerResult::new(customer.id.clone(), CustomerStatus::Processing)
            .with_name(&customer.name);
        result.existing_sections = self.job.existing.get(&customer.id).copied();
        match self.deps.generator.generate(&customer, &flags, &period).await {
            Ok(dataset) => {
                result.status = CustomerStatus::Success;
                result.dataset = Some(dataset);
            }
            Err(err) => {
                warn!(customer_id = %customer.id, error = %err, "manual generation failed");
                result.mark_failed(err.to_string());
            }
        }

        self.manual = Some(ManualSlot {
            customer,
            period,
            result: result.clone(),
        });
        self.publish();
        Ok(result)
    }

    pub(super) fn save_one(&mut self) -> Result<CustomerResult, EngineError> {
        let slot = self.manual.take().ok_or(EngineError::NoManualResult)?;
        let Some(dataset) = slot.result.dataset.clone() else {
            let customer_id = slot.customer.id.to_string();
            self.manual = Some(slot);
            return Err(EngineError::NothingToSave(customer_id));
        };

        let report = self
            .deps
            .persistence
            .save(&dataset, &slot.customer, &slot.period);
        let mut saved = slot.result;
        saved.mark_generated(dataset, &report);
        info!(
            customer_id = %slot.customer.id,
            period = %slot.period,
            status = %saved.status,
            "manual result saved"
        );

        if slot.period == self.job.period {
            if report.stored_any() {
                self.job
                    .existing
                    .entry(slot.customer.id.clone())
                    .or_default()
                    .merge(report.saved_flags());
            }
            if let Some(index) = self.job.position_of(&slot.customer.id) {
                self.job.results[index] = saved.clone();
            }
        }
        self.publish();
        Ok(saved)
    }

    async fn find_customer(
        &self,
        customer_id: &CustomerId,
    ) -> Result<CustomerDescriptor, EngineError> {
        if let Some(index) = self.job.position_of(customer_id) {
            return Ok(self.job.customers[index].clone());
        }
        self.deps
            .directory
            .list_customers()
            .await?
            .into_iter()
            .find(|customer| &customer.id == customer_id)
            .ok_or_else(|| EngineError::CustomerNotFound(customer_id.to_string()))
    }
}
