pub mod supervisor;
pub mod worker;

/// Name a worker process stamps on the rows it claims:
/// `worker-<index>-<pid>`. The index comes from the supervisor, the pid is
/// the worker's own.
#[must_use]
pub fn worker_name(index: u32) -> String {
    format!("worker-{index}-{}", std::process::id())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_worker_name_embeds_index_and_pid() {
        let name = worker_name(2);
        assert!(name.starts_with("worker-2-"));
        assert!(name.ends_with(&std::process::id().to_string()));
    }
}
