//! Wiring from configuration to a ready dispatcher.

use std::sync::Arc;

use chrono::FixedOffset;

use crate::config::Config;
use crate::curator::{CuratorRegistry, ExaCurator, RssCurator};
use crate::db::Repository;
use crate::dispatcher::Dispatcher;
use crate::error::{AppError, Result};
use crate::herald::{DiscordClient, Herald, SlackClient, SmtpMailer, Transports, TwilioClient};
use crate::maintenance::SlackTokenRefresher;
use crate::reaper::{FsBlobStore, HttpScraper, Reaper};
use crate::sage::{ClaudeSynthesizer, Sage};

pub async fn build_dispatcher(config: &Config) -> Result<Dispatcher> {
    config.dispatch.validate()?;
    let repository = Repository::new(&config.db_path).await?;
    let blobs = Arc::new(FsBlobStore::new(&config.blob_dir));

    let mut curators = CuratorRegistry::new();
    curators.register(Arc::new(RssCurator::new()?));
    if let Some(key) = &config.providers.exa_api_key {
        curators.register(Arc::new(ExaCurator::new(key.clone())?));
    }
    tracing::info!(providers = ?curators.providers(), "curators registered");

    let api_key = config
        .providers
        .anthropic_api_key
        .clone()
        .ok_or_else(|| AppError::Config("providers.anthropic_api_key is required".into()))?;
    let synthesizer = ClaudeSynthesizer::new(api_key)?;
    tracing::info!(model = synthesizer.model_version(), "synthesizer ready");

    let reaper = Reaper::new(repository.clone(), Arc::new(HttpScraper::new()?), blobs.clone());
    let sage = Sage::new(repository.clone(), blobs, Arc::new(synthesizer));

    let transports = Transports {
        mail: Arc::new(SmtpMailer::new(&config.smtp)?),
        slack: Arc::new(SlackClient::new()?),
        discord: Arc::new(DiscordClient::new(config.discord.bot_token.clone())?),
        sms: Arc::new(TwilioClient::new(config.twilio.clone())?),
    };
    let herald = Herald::new(repository.clone(), transports)?;

    let offset = FixedOffset::east_opt(config.utc_offset_hours * 3600).ok_or_else(|| {
        AppError::Config(format!("utc_offset_hours {} is out of range", config.utc_offset_hours))
    })?;

    let mut dispatcher = Dispatcher::new(
        repository.clone(),
        curators,
        reaper,
        sage,
        herald,
        config.dispatch.clone(),
    )
    .with_offset(offset)
    .with_base_url(config.base_url.clone());

    if let Some(refresher) = SlackTokenRefresher::from_config(repository, &config.slack)? {
        dispatcher = dispatcher.with_refresher(Arc::new(refresher));
    }
    Ok(dispatcher)
}
