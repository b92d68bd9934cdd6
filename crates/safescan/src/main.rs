//! `safescan` - CLI for safescan
//!
//! This binary manages the emergency profile, renders its QR code, serves
//! the token lookup endpoint and resolves scanned links.

#![warn(missing_debug_implementations)]
#![deny(unsafe_code)]

use std::process::ExitCode;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{bail, Context};
use clap::Parser;
use tracing::{info, warn};

use safescan::cli::{
    Cli, Command, ConfigCommand, LinkCommand, ProfileCommand, PublishCommand, QrCommand, QrFormat,
    ResolveCommand, ScansCommand, ServeCommand, SetProfileArgs, ShareCommand, SosCommand,
    StatusCommand,
};
use safescan::profile::Profile;
use safescan::qr::{QrContent, QrMode, ShareLink};
use safescan::resolver::Resolution;
use safescan::service::server;
use safescan::view::EmergencyCard;
use safescan::{
    init_logging, share, Config, EmergencyResolver, HttpResolutionService,
    LocalResolutionService, ProfileForm, ProfileRepository, ResolutionService, ScanInput, Storage,
};

/// Exit code when a scan could not be resolved.
const EXIT_UNRESOLVED: u8 = 2;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Initialize logging based on verbosity
    init_logging(cli.verbosity());

    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<ExitCode> {
    // `config validate` reports problems instead of failing on them.
    if let Command::Config(ConfigCommand::Validate { file }) = &cli.command {
        return Ok(handle_config_validate(file.clone().or(cli.config.clone())));
    }

    let config = Config::load_from(cli.config.clone()).context("loading configuration")?;

    match cli.command {
        Command::Profile(cmd) => handle_profile(&config, cmd)?,
        Command::Publish(cmd) => handle_publish(&config, &cmd)?,
        Command::Link(cmd) => handle_link(&config, &cmd)?,
        Command::Qr(cmd) => handle_qr(&config, &cmd)?,
        Command::Resolve(cmd) => return handle_resolve(&config, &cmd).await,
        Command::Serve(cmd) => handle_serve(config, cmd).await?,
        Command::Scans(cmd) => handle_scans(&config, &cmd)?,
        Command::Status(cmd) => handle_status(&config, &cmd)?,
        Command::Share(cmd) => handle_share(&config, &cmd)?,
        Command::Sos(cmd) => handle_sos(&config, &cmd).await?,
        Command::Config(cmd) => handle_config(&config, &cmd)?,
    }
    Ok(ExitCode::SUCCESS)
}

fn open_storage(config: &Config) -> anyhow::Result<Storage> {
    let path = config.database_path();
    Storage::open(&path).with_context(|| format!("opening database {}", path.display()))
}

fn require_profile(storage: &Storage) -> anyhow::Result<Profile> {
    Ok(storage.require()?)
}

fn handle_profile(config: &Config, cmd: ProfileCommand) -> anyhow::Result<()> {
    let storage = open_storage(config)?;

    if let ProfileCommand::Show { json } = cmd {
        let profile = require_profile(&storage)?;
        if json {
            println!("{}", serde_json::to_string_pretty(&profile)?);
        } else {
            print_profile(&profile);
        }
        return Ok(());
    }

    let form = match cmd {
        ProfileCommand::Set(args) => form_from_args(args),
        edit => {
            let mut form = ProfileForm::from_saved(&require_profile(&storage)?);
            apply_edit(&mut form, edit).map_err(anyhow::Error::msg)?;
            form
        }
    };

    let profile = form.submit()?;
    storage.save(&profile)?;
    info!("Profile saved ({}% complete)", profile.completeness_percent());
    println!("Saved profile for {}.", profile.full_name);
    Ok(())
}

/// Apply a single-field edit to the form.
fn apply_edit(form: &mut ProfileForm, cmd: ProfileCommand) -> Result<(), String> {
    match cmd {
        ProfileCommand::Show { .. } | ProfileCommand::Set(_) => Ok(()),
        ProfileCommand::AddContact {
            name,
            phone,
            relationship,
        } => form
            .add_contact(&name, &phone, relationship.as_deref())
            .then_some(())
            .ok_or_else(|| "a contact needs both a name and a phone number".to_string()),
        ProfileCommand::RemoveContact { index } => {
            let removed = form
                .remove_contact(usize::from(index) - 1)
                .ok_or_else(|| format!("no contact number {index}"))?;
            println!("Removed {}.", removed.name);
            Ok(())
        }
        ProfileCommand::AddAllergy { allergy } => form
            .add_allergy(&allergy)
            .then_some(())
            .ok_or_else(|| "allergy cannot be empty".to_string()),
        ProfileCommand::AddMedication { medication } => form
            .add_medication(&medication)
            .then_some(())
            .ok_or_else(|| "medication cannot be empty".to_string()),
    }
}

fn form_from_args(args: SetProfileArgs) -> ProfileForm {
    let mut form = ProfileForm::new();
    form.full_name = args.name;
    form.blood_group = Some(args.blood_group);
    form.dob = args.dob;
    form.insurance = args.insurance;
    form.organ_donor = args.organ_donor;
    for allergy in &args.allergies {
        form.add_allergy(allergy);
    }
    for medication in &args.medications {
        form.add_medication(medication);
    }
    for contact in &args.contacts {
        form.add_contact(&contact.name, &contact.phone, contact.relationship.as_deref());
    }
    form
}

fn print_profile(profile: &Profile) {
    println!("Emergency Profile");
    println!("=================");
    println!("Name:         {}", profile.full_name);
    println!("Blood group:  {}", profile.blood_group);
    if let Some(dob) = profile.dob {
        println!("DOB:          {}", dob.format("%-d %B %Y"));
    }
    if let Some(insurance) = &profile.insurance {
        println!("Insurance:    {insurance}");
    }
    println!(
        "Organ donor:  {}",
        if profile.organ_donor { "yes" } else { "no" }
    );
    if !profile.allergies.is_empty() {
        println!("Allergies:    {}", profile.allergies.join(", "));
    }
    if !profile.medications.is_empty() {
        println!("Medications:  {}", profile.medications.join(", "));
    }
    println!("Contacts:");
    for (i, contact) in profile.contacts.iter().enumerate() {
        match &contact.relationship {
            Some(rel) => println!("  {}. {} ({}) {}", i + 1, contact.name, rel, contact.phone),
            None => println!("  {}. {} {}", i + 1, contact.name, contact.phone),
        }
    }
    println!("Complete:     {}%", profile.completeness_percent());
}

fn handle_publish(config: &Config, cmd: &PublishCommand) -> anyhow::Result<()> {
    let storage = open_storage(config)?;
    let profile = require_profile(&storage)?;
    let ttl = cmd
        .ttl_hours
        .map_or_else(|| config.token_ttl(), |hours| chrono::Duration::hours(i64::from(hours)));

    let issued = storage.publish_and_issue(&config.service.user_id, &profile, ttl)?;
    println!("Published profile for {}.", profile.full_name);
    println!("Token:   {}", issued.token);
    println!("Expires: {}", issued.expires_at.format("%Y-%m-%d %H:%M UTC"));
    println!(
        "Link:    {}",
        ShareLink::for_profile(&config.view_url()?, Some(&issued.token), &profile)
    );
    Ok(())
}

/// Publish and issue a token unless running offline.
fn linked_token(
    storage: &Storage,
    config: &Config,
    profile: &Profile,
    offline: bool,
) -> anyhow::Result<Option<String>> {
    if offline {
        return Ok(None);
    }
    let issued = storage.publish_and_issue(&config.service.user_id, profile, config.token_ttl())?;
    Ok(Some(issued.token))
}

fn handle_link(config: &Config, cmd: &LinkCommand) -> anyhow::Result<()> {
    let storage = open_storage(config)?;
    let profile = require_profile(&storage)?;
    let token = linked_token(&storage, config, &profile, cmd.offline)?;
    println!(
        "{}",
        ShareLink::for_profile(&config.view_url()?, token.as_deref(), &profile)
    );
    Ok(())
}

fn handle_qr(config: &Config, cmd: &QrCommand) -> anyhow::Result<()> {
    let storage = open_storage(config)?;
    let profile = require_profile(&storage)?;

    let mode = cmd.mode.unwrap_or(config.qr.mode);
    let token = match mode {
        QrMode::Linked => linked_token(&storage, config, &profile, cmd.offline)?,
        QrMode::Direct => None,
    };
    let content = QrContent::for_profile(&profile, mode, &config.view_url()?, token.as_deref());

    let mut options = config.qr_options();
    if let Some(size) = cmd.size {
        if size == 0 {
            bail!("--size must be greater than 0");
        }
        options.size = size;
    }
    if let Some(level) = cmd.error_correction {
        options.error_correction = level;
    }

    let rendered = match cmd.format {
        QrFormat::Terminal => content.render_terminal(&options)?,
        QrFormat::Svg => content.render_svg(&options)?,
        QrFormat::Text => content.to_string(),
    };

    match &cmd.output {
        Some(path) => {
            std::fs::write(path, &rendered)
                .with_context(|| format!("writing {}", path.display()))?;
            println!("Wrote {} QR code to {}", mode, path.display());
        }
        None => println!("{rendered}"),
    }
    Ok(())
}

async fn handle_resolve(config: &Config, cmd: &ResolveCommand) -> anyhow::Result<ExitCode> {
    let input = ScanInput::from_url(&cmd.url).context("parsing scanned link")?;

    let resolution = match config.service_url()? {
        Some(url) => {
            let service = HttpResolutionService::new(
                url,
                config.service.api_key.clone(),
                config.request_timeout(),
            )?;
            resolve_with(service, &input).await
        }
        None => {
            let service = LocalResolutionService::new(Arc::new(Mutex::new(open_storage(config)?)));
            resolve_with(service, &input).await
        }
    };

    if cmd.json {
        let body = serde_json::json!({
            "state": format!("{:?}", resolution.state()),
            "source": resolution.source().map(|s| s.to_string()),
            "profile": resolution.profile(),
        });
        println!("{}", serde_json::to_string_pretty(&body)?);
    }

    match resolution.profile() {
        Some(profile) => {
            if !cmd.json {
                println!("{}", EmergencyCard::new(profile, &config.display));
            }
            Ok(ExitCode::SUCCESS)
        }
        None => {
            if let (Some((title, detail)), false) = (resolution.user_message(), cmd.json) {
                println!("{title}");
                println!("{detail}");
            }
            Ok(ExitCode::from(EXIT_UNRESOLVED))
        }
    }
}

async fn resolve_with<S: ResolutionService>(service: S, input: &ScanInput) -> Resolution {
    EmergencyResolver::new(service).resolve(input).await
}

async fn handle_serve(mut config: Config, cmd: ServeCommand) -> anyhow::Result<()> {
    if let Some(bind) = cmd.bind {
        config.server.bind_address = bind;
        config.validate()?;
    }
    let storage = open_storage(&config)?;
    server::serve(&config, Arc::new(Mutex::new(storage))).await?;
    Ok(())
}

fn handle_scans(config: &Config, cmd: &ScansCommand) -> anyhow::Result<()> {
    let storage = open_storage(config)?;
    let scans = storage.recent_scans(&config.service.user_id, cmd.limit)?;

    if cmd.json {
        let rows: Vec<_> = scans
            .iter()
            .map(|s| {
                serde_json::json!({
                    "id": s.id,
                    "token_id": s.token_id,
                    "scanner_ip": s.scanner_ip,
                    "scanned_at": s.scanned_at,
                })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&rows)?);
    } else if scans.is_empty() {
        println!("No scans recorded.");
    } else {
        for scan in &scans {
            println!(
                "{}  token #{:<4} from {}",
                scan.scanned_at.format("%Y-%m-%d %H:%M:%S"),
                scan.token_id,
                scan.scanner_ip
            );
        }
    }
    Ok(())
}

fn handle_status(config: &Config, cmd: &StatusCommand) -> anyhow::Result<()> {
    let storage = open_storage(config)?;
    let profile = storage.load()?;
    let stats = storage.stats()?;
    let service = config
        .service
        .base_url
        .clone()
        .unwrap_or_else(|| "local store".to_string());

    if cmd.json {
        let status = serde_json::json!({
            "database_path": config.database_path(),
            "profile_saved": profile.is_some(),
            "profile_saved_at": stats.profile_saved_at,
            "completeness_percent": profile.as_ref().map(Profile::completeness_percent),
            "published_profiles": stats.published_profiles,
            "total_tokens": stats.total_tokens,
            "active_tokens": stats.active_tokens,
            "total_scans": stats.total_scans,
            "db_size_bytes": stats.db_size_bytes,
            "resolution_service": service,
        });
        println!("{}", serde_json::to_string_pretty(&status)?);
    } else {
        println!("safescan status");
        println!("---------------");
        println!("Database:      {}", config.database_path().display());
        match &profile {
            Some(p) => println!(
                "Profile:       {} ({}% complete)",
                p.full_name,
                p.completeness_percent()
            ),
            None => println!("Profile:       not set"),
        }
        if let Some(saved) = stats.profile_saved_at {
            println!("Saved at:      {}", saved.format("%Y-%m-%d %H:%M UTC"));
        }
        println!(
            "Tokens:        {} active / {} total",
            stats.active_tokens, stats.total_tokens
        );
        println!("Scans:         {}", stats.total_scans);
        println!("Lookups via:   {service}");
        println!("Database size: {} bytes", stats.db_size_bytes);
    }
    Ok(())
}

fn handle_share(config: &Config, cmd: &ShareCommand) -> anyhow::Result<()> {
    let storage = open_storage(config)?;
    let profile = require_profile(&storage)?;
    let text = share::share_text(&profile);

    if cmd.clipboard {
        share::copy_to_clipboard(&text)?;
        println!("Emergency profile copied to clipboard.");
    } else {
        println!("{text}");
    }
    Ok(())
}

async fn handle_sos(config: &Config, cmd: &SosCommand) -> anyhow::Result<()> {
    let profile = open_storage(config)?.load()?;

    for remaining in (1..=cmd.countdown).rev() {
        println!("Activating SOS in {remaining}s... (Ctrl-C to cancel)");
        tokio::select! {
            () = tokio::time::sleep(Duration::from_secs(1)) => {}
            _ = tokio::signal::ctrl_c() => {
                println!("SOS cancelled.");
                return Ok(());
            }
        }
    }

    warn!("SOS activated");
    println!("🚨 SOS Active");
    match profile.as_ref().map(share::dial_links) {
        Some(links) if !links.is_empty() => {
            println!("Emergency contacts:");
            for link in links {
                println!("  {:<20} {}", link.name, link.href);
            }
        }
        _ => println!("No emergency contacts saved."),
    }
    println!(
        "Ambulance: {}",
        share::tel_href(&config.display.ambulance_number)
    );
    println!("Police:    {}", share::tel_href(&config.display.police_number));
    Ok(())
}

fn handle_config(config: &Config, cmd: &ConfigCommand) -> anyhow::Result<()> {
    match cmd {
        ConfigCommand::Show { json } => {
            if *json {
                println!("{}", serde_json::to_string_pretty(config)?);
            } else {
                println!("Current Configuration");
                println!("=====================");
                println!();
                println!("[Storage]");
                println!("  Database path:    {}", config.database_path().display());
                println!();
                println!("[Service]");
                println!(
                    "  Base URL:         {}",
                    config.service.base_url.as_deref().unwrap_or("(local store)")
                );
                println!(
                    "  API key:          {}",
                    if config.service.api_key.is_some() { "set" } else { "not set" }
                );
                println!("  User id:          {}", config.service.user_id);
                println!("  Token TTL:        {}h", config.service.token_ttl_hours);
                match config.service.timeout_secs {
                    Some(secs) => println!("  Timeout:          {secs}s"),
                    None => println!("  Timeout:          none"),
                }
                println!();
                println!("[Server]");
                println!("  Bind address:     {}", config.server.bind_address);
                println!("  Endpoint path:    {}", config.server.endpoint_path);
                println!("  Require API key:  {}", config.server.require_api_key);
                println!();
                println!("[QR]");
                println!("  View URL:         {}", config.qr.view_url);
                println!("  Size:             {}", config.qr.size);
                println!("  Error correction: {:?}", config.qr.error_correction);
                println!("  Mode:             {}", config.qr.mode);
                println!();
                println!("[Display]");
                println!("  Ambulance:        {}", config.display.ambulance_number);
                println!("  Police:           {}", config.display.police_number);
            }
        }
        ConfigCommand::Path => {
            println!("{}", Config::default_config_path().display());
        }
        ConfigCommand::Validate { .. } => {}
    }
    Ok(())
}

fn handle_config_validate(file: Option<std::path::PathBuf>) -> ExitCode {
    let path = file.unwrap_or_else(Config::default_config_path);
    println!("Validating configuration: {}", path.display());
    match Config::load_from(Some(path)) {
        Ok(_) => {
            println!("Configuration is valid.");
            ExitCode::SUCCESS
        }
        Err(e) => {
            println!("Configuration error: {e}");
            ExitCode::FAILURE
        }
    }
}
