use std::sync::Arc;
use tuck_dispatch::Engine;

#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<Engine>,
}

impl AppState {
    pub fn new(engine: Engine) -> Self {
        Self { engine: Arc::new(engine) }
    }
}
