use serde::Serialize;

use crate::cli::ConfigCommands;
use crate::config_profiles::{
    is_http_url, normalize_text_option, CliProfile, CliProfilesConfig, LEDGER_URL_ENV_VAR,
};
use crate::error::CliError;
use crate::signer::resolve_signer_token;

/// Values supplied to `config init`; `None` keeps what the profile has
#[derive(Debug, Clone, Default)]
pub struct ProfileUpdate {
    pub ledger_url: Option<String>,
    pub health_url: Option<String>,
    pub max_attempts: Option<u32>,
    pub inter_item_delay_ms: Option<u64>,
    pub settle_delay_ms: Option<u64>,
    pub poll_interval_ms: Option<u64>,
}

#[derive(Debug, Serialize)]
struct ProfileView<'a> {
    profile: &'a str,
    active: bool,
    ledger_url: Option<String>,
    health_url: Option<String>,
    signer_configured: bool,
    sync: votequeue_core::SyncOptions,
}

pub fn run_config(command: ConfigCommands, global_profile: Option<&str>) -> Result<(), CliError> {
    match command {
        ConfigCommands::Init {
            profile,
            ledger_url,
            health_url,
            max_attempts,
            inter_item_delay_ms,
            settle_delay_ms,
            poll_interval_ms,
            no_activate,
        } => run_config_init(
            profile.as_deref().or(global_profile),
            ProfileUpdate {
                ledger_url,
                health_url,
                max_attempts,
                inter_item_delay_ms,
                settle_delay_ms,
                poll_interval_ms,
            },
            no_activate,
        ),
        ConfigCommands::Show { profile, json } => {
            run_config_show(profile.as_deref().or(global_profile), json)
        }
    }
}

pub fn run_config_init(
    profile_name: Option<&str>,
    update: ProfileUpdate,
    no_activate: bool,
) -> Result<(), CliError> {
    let mut config = CliProfilesConfig::load().map_err(CliError::Config)?;
    let profile_name = config.resolve_profile_name(profile_name);
    apply_profile_update(&mut config, &profile_name, update, !no_activate)?;

    let path = config.save().map_err(CliError::Config)?;
    println!(
        "Profile '{}' initialized at {}",
        profile_name,
        path.display()
    );

    let profile = config
        .profile(&profile_name)
        .ok_or_else(|| CliError::Config("Failed to persist profile".to_string()))?;
    if profile.ledger_url().is_none() {
        println!("Profile '{profile_name}' is missing: ledger_url");
    } else if resolve_signer_token(&profile_name)?.is_none() {
        println!(
            "Ledger configured. Run `votequeue signer set --profile {profile_name}` to enable submissions."
        );
    } else {
        println!("Profile '{profile_name}' is ready.");
    }

    Ok(())
}

/// Merge explicit values (then `VOTEQUEUE_LEDGER_URL`) into the named profile
pub fn apply_profile_update(
    config: &mut CliProfilesConfig,
    profile_name: &str,
    update: ProfileUpdate,
    activate: bool,
) -> Result<(), CliError> {
    let ledger_url = normalize_text_option(update.ledger_url)
        .or_else(|| normalize_text_option(std::env::var(LEDGER_URL_ENV_VAR).ok()));
    let health_url = normalize_text_option(update.health_url);

    let profile = config.profile_mut_or_default(profile_name);
    if let Some(value) = ledger_url {
        profile.ledger_url = Some(value.trim_end_matches('/').to_string());
    }
    if let Some(value) = health_url {
        profile.health_url = Some(value);
    }
    if let Some(value) = update.max_attempts {
        if value == 0 {
            return Err(CliError::Config("max_attempts must be at least 1".to_string()));
        }
        profile.max_attempts = Some(value);
    }
    if update.inter_item_delay_ms.is_some() {
        profile.inter_item_delay_ms = update.inter_item_delay_ms;
    }
    if update.settle_delay_ms.is_some() {
        profile.settle_delay_ms = update.settle_delay_ms;
    }
    if update.poll_interval_ms.is_some() {
        profile.poll_interval_ms = update.poll_interval_ms;
    }

    validate_profile_urls(profile)?;

    if activate {
        config.active_profile = Some(profile_name.to_string());
    }
    Ok(())
}

pub fn run_config_show(profile_name: Option<&str>, as_json: bool) -> Result<(), CliError> {
    let config = CliProfilesConfig::load().map_err(CliError::Config)?;
    let profile_name = config.resolve_profile_name(profile_name);
    let Some(profile) = config.profile(&profile_name) else {
        println!("Profile '{profile_name}' is not configured.");
        return Ok(());
    };

    let view = ProfileView {
        profile: &profile_name,
        active: config.active_profile.as_deref() == Some(profile_name.as_str()),
        ledger_url: profile.ledger_url(),
        health_url: profile.health_url(),
        signer_configured: resolve_signer_token(&profile_name)?.is_some(),
        sync: profile.sync_options(),
    };

    if as_json {
        println!("{}", serde_json::to_string_pretty(&view)?);
        return Ok(());
    }

    println!(
        "Profile:       {}{}",
        view.profile,
        if view.active { " (active)" } else { "" }
    );
    println!(
        "Ledger URL:    {}",
        view.ledger_url.as_deref().unwrap_or("(not set)")
    );
    println!(
        "Health URL:    {}",
        view.health_url.as_deref().unwrap_or("(not set)")
    );
    println!(
        "Signer:        {}",
        if view.signer_configured {
            "configured"
        } else {
            "missing"
        }
    );
    println!("Max attempts:  {}", view.sync.max_attempts);
    println!("Item delay:    {}ms", view.sync.inter_item_delay_ms);
    println!("Settle delay:  {}ms", view.sync.settle_delay_ms);
    println!("Poll interval: {}ms", view.sync.poll_interval_ms);
    Ok(())
}

fn validate_profile_urls(profile: &CliProfile) -> Result<(), CliError> {
    if let Some(url) = normalize_text_option(profile.ledger_url.clone()) {
        if !is_http_url(&url) {
            return Err(CliError::Config(
                "ledger_url must include http:// or https://".to_string(),
            ));
        }
    }
    if let Some(url) = normalize_text_option(profile.health_url.clone()) {
        if !is_http_url(&url) {
            return Err(CliError::Config(
                "health_url must include http:// or https://".to_string(),
            ));
        }
    }
    Ok(())
}
