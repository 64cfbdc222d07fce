use std::sync::Arc;

use tokio::sync::mpsc;

use centime_scheduler::{LifecycleController, RunNow};
use centime_store::LedgerStore;

pub struct AppState {
    pub store: Arc<dyn LedgerStore>,
    pub lifecycle: LifecycleController,
    pub sweep_trigger: mpsc::Sender<RunNow>,
    /// Which backend is serving; reported by /health.
    pub store_backend: &'static str,
}
