use std::sync::Arc;

use crate::governor::Governor;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub governor: Arc<Governor>,
}

impl AppState {
    pub fn new(governor: Governor) -> Self {
        Self {
            governor: Arc::new(governor),
        }
    }
}
