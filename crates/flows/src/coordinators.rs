use shared::{
    domain::{CallType, InstitutionId},
    error::RequestError,
};
use tracing::info;

use crate::{
    collaborators::{CoordinatorAllocator, CoordinatorStore},
    error::{allocation, storage, FlowError},
};

/// Moves existing institution forms over to the institution's currently
/// allocated coordinator, after the assignment changed outside the flows.
pub async fn reassign_coordinator(
    allocator: &dyn CoordinatorAllocator,
    store: &dyn CoordinatorStore,
    institution_id: InstitutionId,
    call_type: CallType,
) -> Result<u64, FlowError> {
    let coordinator = allocator
        .allocate(institution_id, call_type)
        .await
        .map_err(allocation)?
        .ok_or(RequestError::CantFindAssociatedCoordinator(institution_id))?;
    let updated = store
        .update_coordinator(coordinator.id, institution_id, call_type)
        .await
        .map_err(storage)?;
    info!(
        %institution_id,
        coordinator_id = %coordinator.id,
        call_type = call_type.as_str(),
        updated,
        "institution forms reassigned"
    );
    Ok(updated)
}
