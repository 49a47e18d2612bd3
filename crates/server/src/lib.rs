use std::sync::Arc;

use config::Settings;
use db::DBService;
use services::services::{
    analysis::CodeAnalyzer, github::SourceProvider, orchestrator::AnalysisOrchestrator,
    static_analysis::StaticAnalyzer,
};

pub mod error;
pub mod http;
pub mod routes;

/// Everything the HTTP layer needs, assembled once at startup. Cloning is
/// cheap; the collaborators sit behind `Arc`.
#[derive(Clone)]
pub struct AppState {
    pub db: DBService,
    pub settings: Settings,
    pub orchestrator: AnalysisOrchestrator,
    pub analyzer: Arc<dyn CodeAnalyzer>,
    pub static_analyzer: Arc<dyn StaticAnalyzer>,
}

impl AppState {
    pub fn new(
        db: DBService,
        settings: Settings,
        source: Arc<dyn SourceProvider>,
        analyzer: Arc<dyn CodeAnalyzer>,
        static_analyzer: Arc<dyn StaticAnalyzer>,
    ) -> Self {
        let orchestrator = AnalysisOrchestrator::new(
            db.clone(),
            source,
            analyzer.clone(),
            static_analyzer.clone(),
        );
        Self {
            db,
            settings,
            orchestrator,
            analyzer,
            static_analyzer,
        }
    }
}
