use std::io::{self, IsTerminal, Read};

use crate::cli::SignerCommands;
use crate::config_profiles::{normalize_text_option, CliProfilesConfig};
use crate::error::CliError;
use crate::signer::{
    clear_stored_signer_token, resolve_signer_token, store_signer_token, SignerSource,
    SIGNER_TOKEN_ENV_VAR,
};

pub fn run_signer(command: SignerCommands, global_profile: Option<&str>) -> Result<(), CliError> {
    let config = CliProfilesConfig::load().map_err(CliError::Config)?;

    match command {
        SignerCommands::Set { profile, token } => {
            let profile_name = config.resolve_profile_name(profile.as_deref().or(global_profile));
            let token = resolve_token_input(token)?;
            store_signer_token(&profile_name, &token)?;
            println!("Signer token stored for profile '{profile_name}'");
            Ok(())
        }
        SignerCommands::Status { profile } => {
            let profile_name = config.resolve_profile_name(profile.as_deref().or(global_profile));
            match resolve_signer_token(&profile_name)? {
                Some((_, SignerSource::Environment)) => {
                    println!(
                        "Profile '{profile_name}' uses the signer token from {SIGNER_TOKEN_ENV_VAR}"
                    );
                }
                Some((_, SignerSource::Keychain)) => {
                    println!("Profile '{profile_name}' has a signer token in the keychain");
                }
                None => {
                    println!("Profile '{profile_name}' has no signer token; votes will stay queued");
                }
            }
            Ok(())
        }
        SignerCommands::Clear { profile } => {
            let profile_name = config.resolve_profile_name(profile.as_deref().or(global_profile));
            clear_stored_signer_token(&profile_name)?;
            println!("Cleared signer token for profile '{profile_name}'");
            Ok(())
        }
    }
}

/// Token from the flag, else from piped stdin
fn resolve_token_input(token: Option<String>) -> Result<String, CliError> {
    if let Some(token) = normalize_text_option(token) {
        return Ok(token);
    }

    let stdin = io::stdin();
    if stdin.is_terminal() {
        return Err(CliError::EmptySignerToken);
    }
    let mut buffer = String::new();
    stdin.lock().read_to_string(&mut buffer)?;
    normalize_text_option(Some(buffer)).ok_or(CliError::EmptySignerToken)
}
