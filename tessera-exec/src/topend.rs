use fnv::FnvHashMap;
use parking_lot::Mutex;
use std::collections::VecDeque;
use tessera_storage::error::FatalError;

/// Topend is the host side of the engine. The engine calls back into
/// it to pull dependency tables, report crashes and forward logs.
pub trait Topend {
    /// Next serialized table produced for given dependency,
    /// None once all have been delivered.
    fn load_next_dependency(&self, dependency_id: i64) -> Option<Vec<u8>>;

    /// Called before an unrecoverable error unwinds out of the engine.
    fn crash(&self, err: &FatalError);

    #[inline]
    fn log(&self, _level: log::Level, _message: &str) {}

    /// Hands a filled export buffer of given stream to the host.
    #[inline]
    fn push_export_buffer(&self, _partition_id: i32, _signature: &str, _data: &[u8]) {}

    /// Bytes of export data still queued on the host for given stream.
    #[inline]
    fn queued_export_bytes(&self, _partition_id: i32, _signature: &str) -> i64 {
        0
    }
}

/// Topend for an engine embedded in the host process.
/// Dependencies are queued in memory before execution.
#[derive(Default)]
pub struct LocalTopend {
    dependencies: Mutex<FnvHashMap<i64, VecDeque<Vec<u8>>>>,
    crashes: Mutex<Vec<String>>,
    logs: Mutex<Vec<(log::Level, String)>>,
}

impl LocalTopend {
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn push_dependency(&self, dependency_id: i64, data: Vec<u8>) {
        self.dependencies
            .lock()
            .entry(dependency_id)
            .or_default()
            .push_back(data);
    }

    #[inline]
    pub fn crashes(&self) -> Vec<String> {
        self.crashes.lock().clone()
    }

    #[inline]
    pub fn logs(&self) -> Vec<(log::Level, String)> {
        self.logs.lock().clone()
    }
}

impl Topend for LocalTopend {
    #[inline]
    fn load_next_dependency(&self, dependency_id: i64) -> Option<Vec<u8>> {
        self.dependencies
            .lock()
            .get_mut(&dependency_id)
            .and_then(|q| q.pop_front())
    }

    #[inline]
    fn crash(&self, err: &FatalError) {
        self.crashes.lock().push(err.to_string());
    }

    #[inline]
    fn log(&self, level: log::Level, message: &str) {
        self.logs.lock().push((level, message.to_string()));
    }
}

impl<T: Topend + ?Sized> Topend for std::sync::Arc<T> {
    #[inline]
    fn load_next_dependency(&self, dependency_id: i64) -> Option<Vec<u8>> {
        (**self).load_next_dependency(dependency_id)
    }

    #[inline]
    fn crash(&self, err: &FatalError) {
        (**self).crash(err)
    }

    #[inline]
    fn log(&self, level: log::Level, message: &str) {
        (**self).log(level, message)
    }

    #[inline]
    fn push_export_buffer(&self, partition_id: i32, signature: &str, data: &[u8]) {
        (**self).push_export_buffer(partition_id, signature, data)
    }

    #[inline]
    fn queued_export_bytes(&self, partition_id: i32, signature: &str) -> i64 {
        (**self).queued_export_bytes(partition_id, signature)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_local_dependencies() {
        let t = LocalTopend::new();
        t.push_dependency(1, vec![1]);
        t.push_dependency(1, vec![2]);
        assert_eq!(t.load_next_dependency(1), Some(vec![1]));
        assert_eq!(t.load_next_dependency(1), Some(vec![2]));
        assert_eq!(t.load_next_dependency(1), None);
        assert_eq!(t.load_next_dependency(2), None);
    }
}
