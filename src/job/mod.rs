//! Job payloads, results and scratch space.

mod request;
mod result;
mod workspace;

pub use request::{JobInput, JobPayload, SeparationRequest, StorageTarget};
pub use result::{HandlerResponse, JobResult};
pub use workspace::{JobWorkspace, cleanup_all_workspaces};

/// Fresh identifier for one job invocation.
pub fn new_job_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_ids_are_unique_and_key_safe() {
        let a = new_job_id();
        let b = new_job_id();
        assert_ne!(a, b);
        assert_eq!(a.len(), 32);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
    }
}
