mod error;
mod types;

pub use error::{Error, Result};
pub use types::{
	Collection, Config, Corpora, EmbeddingKind, EmbeddingProviderConfig, Graph, LlmProviderConfig,
	Notifier, Pipeline, Postgres, Providers, Retrieval, ScoreKind, Service,
};

use std::{fs, path::Path};

pub fn load(path: &Path) -> Result<Config> {
	let raw = fs::read_to_string(path)
		.map_err(|err| Error::ReadConfig { path: path.to_path_buf(), source: err })?;
	let mut cfg: Config = toml::from_str(&raw)
		.map_err(|err| Error::ParseConfig { path: path.to_path_buf(), source: err })?;

	normalize(&mut cfg);

	validate(&cfg)?;

	Ok(cfg)
}

pub fn validate(cfg: &Config) -> Result<()> {
	if cfg.service.http_bind.trim().is_empty() {
		return Err(Error::Validation {
			message: "service.http_bind must be non-empty.".to_string(),
		});
	}
	if cfg.providers.embedding.dimensions == 0 {
		return Err(Error::Validation {
			message: "providers.embedding.dimensions must be greater than zero.".to_string(),
		});
	}
	if cfg.providers.embedding.kind == EmbeddingKind::Openai
		&& cfg.providers.embedding.api_key.trim().is_empty()
	{
		return Err(Error::Validation {
			message: "Provider embedding api_key must be non-empty for kind openai.".to_string(),
		});
	}
	if cfg.providers.llm.api_key.trim().is_empty() {
		return Err(Error::Validation {
			message: "Provider llm api_key must be non-empty.".to_string(),
		});
	}

	for (label, timeout_ms) in [
		("providers.embedding.timeout_ms", cfg.providers.embedding.timeout_ms),
		("providers.llm.timeout_ms", cfg.providers.llm.timeout_ms),
		("pipeline.request_timeout_ms", cfg.pipeline.request_timeout_ms),
	] {
		if timeout_ms == 0 {
			return Err(Error::Validation { message: format!("{label} must be greater than zero.") });
		}
	}

	if !cfg.providers.llm.temperature.is_finite() || cfg.providers.llm.temperature < 0.0 {
		return Err(Error::Validation {
			message: "providers.llm.temperature must be a finite number, zero or greater."
				.to_string(),
		});
	}

	for (label, collections) in
		[("corpora.legal", &cfg.corpora.legal), ("corpora.internal", &cfg.corpora.internal)]
	{
		if collections.is_empty() {
			return Err(Error::Validation { message: format!("{label} must be non-empty.") });
		}

		for collection in collections {
			if collection.location.trim().is_empty() || collection.name.trim().is_empty() {
				return Err(Error::Validation {
					message: format!("{label} entries must have a location and a name."),
				});
			}
			if collection.vector_dim == Some(0) {
				return Err(Error::Validation {
					message: format!("{label}.vector_dim must be greater than zero when set."),
				});
			}
		}
	}

	if cfg.retrieval.legal_top_k == 0 {
		return Err(Error::Validation {
			message: "retrieval.legal_top_k must be greater than zero.".to_string(),
		});
	}
	if cfg.retrieval.internal_top_k == 0 {
		return Err(Error::Validation {
			message: "retrieval.internal_top_k must be greater than zero.".to_string(),
		});
	}
	if cfg.graph.postgres.dsn.trim().is_empty() {
		return Err(Error::Validation {
			message: "graph.postgres.dsn must be non-empty.".to_string(),
		});
	}
	if cfg.graph.postgres.pool_max_conns == 0 {
		return Err(Error::Validation {
			message: "graph.postgres.pool_max_conns must be greater than zero.".to_string(),
		});
	}
	if !cfg.graph.fallback_score.is_finite() {
		return Err(Error::Validation {
			message: "graph.fallback_score must be a finite number.".to_string(),
		});
	}
	if cfg.graph.preview_chars == 0 {
		return Err(Error::Validation {
			message: "graph.preview_chars must be greater than zero.".to_string(),
		});
	}
	if cfg.notifier.enabled && cfg.notifier.program.trim().is_empty() {
		return Err(Error::Validation {
			message: "notifier.program must be non-empty when enabled.".to_string(),
		});
	}
	if cfg.notifier.queue_capacity == 0 {
		return Err(Error::Validation {
			message: "notifier.queue_capacity must be greater than zero.".to_string(),
		});
	}

	Ok(())
}

fn normalize(cfg: &mut Config) {
	for collection in cfg.corpora.legal.iter_mut().chain(cfg.corpora.internal.iter_mut()) {
		if collection.vector_name.as_deref().map(|name| name.trim().is_empty()).unwrap_or(false) {
			collection.vector_name = None;
		}
	}

	cfg.pipeline.internal_keywords = cfg
		.pipeline
		.internal_keywords
		.iter()
		.map(|keyword| keyword.trim().to_lowercase())
		.filter(|keyword| !keyword.is_empty())
		.collect();
}
