//! Shared application state, built once at startup.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{info, warn};

use crate::advisory::{AdvisoryService, HttpAdvisoryService};
use crate::config::{resolve_api_key, AppConfig};
use crate::error::{ConfigError, KnowledgeError, RoofMateError};
use crate::estimator::{default_factors, load_factors, Estimator};
use crate::knowledge::{default_knowledge, KnowledgeBase, KnowledgeCatalog, KnowledgeItem};
use crate::orchestrator::Orchestrator;

pub struct AppContext {
    pub config: AppConfig,
    pub knowledge: Arc<KnowledgeBase>,
    pub orchestrator: Orchestrator,
    estimator: Arc<Estimator>,
    history_db: PathBuf,
    knowledge_db: PathBuf,
}

impl AppContext {
    /// Load factors, open the knowledge catalog and wire up the advisory
    /// service. A missing API key or an unreadable knowledge catalog
    /// degrades the service; only configuration errors are fatal.
    pub fn from_config(config: AppConfig) -> Result<Self, RoofMateError> {
        let factors = match &config.factors_path {
            Some(path) => load_factors(path).map_err(|e| ConfigError::Invalid(format!("{:#}", e)))?,
            None => default_factors(),
        };
        let estimator = Arc::new(Estimator::new(factors));

        let history_db = config.history_db_path();
        let knowledge_db = config.knowledge_db_path();

        let knowledge = Arc::new(match load_knowledge(&knowledge_db) {
            Ok(items) => KnowledgeBase::new(items),
            Err(e) => {
                warn!("Knowledge catalog unavailable, using built-in entries: {}", e);
                KnowledgeBase::with_defaults()
            }
        });
        info!("Knowledge base ready with {} entries", knowledge.len());

        let mut orchestrator =
            Orchestrator::new(estimator.clone(), knowledge.clone()).with_timeout(config.timeout());
        if let Some(service) = build_advisory(&config)? {
            orchestrator = orchestrator.with_advisory(service);
        }

        Ok(Self {
            config,
            knowledge,
            orchestrator,
            estimator,
            history_db,
            knowledge_db,
        })
    }

    /// Replace the advisory service, keeping everything else.
    pub fn with_advisory(mut self, service: Arc<dyn AdvisoryService>) -> Self {
        self.orchestrator = Orchestrator::new(self.estimator.clone(), self.knowledge.clone())
            .with_timeout(self.config.timeout())
            .with_advisory(service);
        self
    }

    pub fn history_db(&self) -> &Path {
        &self.history_db
    }

    pub fn knowledge_db(&self) -> &Path {
        &self.knowledge_db
    }
}

fn load_knowledge(db_path: &Path) -> Result<Vec<KnowledgeItem>, KnowledgeError> {
    let catalog = KnowledgeCatalog::new(db_path)?;
    catalog.seed_if_empty(&default_knowledge())?;
    catalog.all()
}

fn build_advisory(config: &AppConfig) -> Result<Option<Arc<dyn AdvisoryService>>, RoofMateError> {
    if !config.advisory.enabled {
        info!("Advisory service disabled by configuration");
        return Ok(None);
    }

    let provider = config.provider()?;
    let Some(api_key) = resolve_api_key(provider) else {
        warn!(
            "No API key for provider '{}'; advisory estimates disabled, results will use fallback",
            provider
        );
        return Ok(None);
    };

    let model = config.model()?;
    info!("Advisory service: provider '{}', model '{}'", provider, model);
    let service = HttpAdvisoryService::new(provider, model, api_key, config.timeout())?;
    Ok(Some(Arc::new(service)))
}
