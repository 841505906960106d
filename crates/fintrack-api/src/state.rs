use std::sync::Arc;

use fintrack_db::Database;

use crate::token::TokenConfig;

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub db: Database,
    pub tokens: TokenConfig,
}
