//! Helper utilities for FFI layer

use std::sync::Arc;

/// Unwrap an Arc or clone it if there are multiple references
pub fn unwrap_or_clone_arc<T: Clone>(arc: Arc<T>) -> T {
    Arc::try_unwrap(arc).unwrap_or_else(|arc| (*arc).clone())
}

/// Shared tokio runtime for every blocking FFI entry point
pub fn get_runtime() -> &'static tokio::runtime::Runtime {
    use std::sync::OnceLock;
    static RUNTIME: OnceLock<tokio::runtime::Runtime> = OnceLock::new();

    RUNTIME.get_or_init(|| {
        tokio::runtime::Builder::new_multi_thread()
            .thread_name("chatbridge-ffi")
            .enable_all()
            .build()
            .expect("Failed to create tokio runtime")
    })
}
