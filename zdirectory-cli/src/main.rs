use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Arg, ArgAction, ArgMatches, Command};
use tracing_subscriber::EnvFilter;
use zdirectory::config::{load_config, validate_config};
use zdirectory::verification::last_verified_label;
use zdirectory::*;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let matches = build_cli().get_matches();

    match matches.subcommand() {
        Some(("normalize", sub_matches)) => {
            let text = required(sub_matches, "text")?;
            println!("{}", normalize_identity(text));
        }
        Some((command, sub_matches)) => {
            let directory = open_directory(&matches).await?;
            match command {
                "list" => list_command(&directory, sub_matches)?,
                "referrers" => referrers_command(&directory, sub_matches)?,
                "show" => show_command(&directory, sub_matches)?,
                "suggest" => suggest_command(&directory, sub_matches)?,
                _ => {
                    build_cli().print_help()?;
                    std::process::exit(1);
                }
            }
        }
        None => {
            build_cli().print_help()?;
            std::process::exit(1);
        }
    }

    Ok(())
}

fn build_cli() -> Command {
    Command::new("zdirectory")
        .version("0.1.0")
        .about("Browse a directory of payment-address profile cards")
        .subcommand_required(true)
        .arg_required_else_help(true)
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .global(true)
                .help("YAML configuration file"),
        )
        .arg(
            Arg::new("database-url")
                .short('d')
                .long("database-url")
                .value_name("URL")
                .global(true)
                .help("PostgreSQL connection URL (defaults to $DATABASE_URL, else bundled demo data)"),
        )
        .subcommand(
            Command::new("list")
                .about("List profiles grouped by first letter")
                .arg(
                    Arg::new("search")
                        .short('s')
                        .long("search")
                        .value_name("TEXT")
                        .help("Only names containing TEXT (case-insensitive)"),
                )
                .arg(
                    Arg::new("filter")
                        .short('f')
                        .long("filter")
                        .value_name("FILTER")
                        .value_parser(["none", "verified", "referred", "ranked", "featured"])
                        .default_value("none")
                        .help("Single active filter"),
                )
                .arg(json_arg()),
        )
        .subcommand(
            Command::new("referrers")
                .about("Show top referrers with their referral counts")
                .arg(json_arg()),
        )
        .subcommand(
            Command::new("show")
                .about("Show every profile using a name")
                .arg(Arg::new("name").value_name("NAME").required(true)),
        )
        .subcommand(
            Command::new("suggest")
                .about("Rank search suggestions for free-text input")
                .arg(Arg::new("text").value_name("TEXT").required(true))
                .arg(
                    Arg::new("limit")
                        .short('n')
                        .long("limit")
                        .value_name("N")
                        .value_parser(clap::value_parser!(usize))
                        .default_value("10")
                        .help("Maximum number of suggestions"),
                ),
        )
        .subcommand(
            Command::new("normalize")
                .about("Print the identity key for a name")
                .arg(Arg::new("text").value_name("TEXT").required(true)),
        )
}

fn json_arg() -> Arg {
    Arg::new("json")
        .long("json")
        .action(ArgAction::SetTrue)
        .help("Print JSON instead of text")
}

fn required<'a>(matches: &'a ArgMatches, id: &str) -> Result<&'a str> {
    matches
        .get_one::<String>(id)
        .map(String::as_str)
        .with_context(|| format!("Missing required argument '{}'", id))
}

async fn open_directory(matches: &ArgMatches) -> Result<Directory> {
    let config = match matches.get_one::<String>("config") {
        Some(path) => load_config(path).await?,
        None => DirectoryConfig::default(),
    };

    let config = match matches.get_one::<String>("database-url") {
        Some(url) => config.with_database_url(Some(url.clone())),
        None => config.with_env(),
    };
    validate_config(&config)?;

    Directory::open(config).await
}

fn list_command(directory: &Directory, matches: &ArgMatches) -> Result<()> {
    let search = matches
        .get_one::<String>("search")
        .map(String::as_str)
        .unwrap_or_default();
    let filter: DirectoryFilter = required(matches, "filter")?
        .parse()
        .map_err(anyhow::Error::msg)?;

    let view = directory.view(&directory.query(search, filter));

    if matches.get_flag("json") {
        println!("{}", serde_json::to_string_pretty(&view)?);
        return Ok(());
    }

    if view.is_empty() {
        println!("No profiles match.");
        return Ok(());
    }

    for (letter, profiles) in &view.grouped {
        println!("{}", letter);
        for profile in profiles {
            println!("  {}", summary_line(profile));
        }
    }
    println!();
    println!("{} profiles, filter: {}", view.len(), filter);
    Ok(())
}

fn summary_line(profile: &AnnotatedProfile) -> String {
    let mut line = format!("{} [{}]", profile.name(), profile.verification.trust_tier);
    if let Some(rank) = profile.referral.rank {
        line.push_str(&format!(" #{} referrer", rank));
    }
    if profile.has_duplicate_name() {
        line.push_str(" (name shared)");
    }
    line
}

fn referrers_command(directory: &Directory, matches: &ArgMatches) -> Result<()> {
    let referrers = directory.top_referrers();

    if matches.get_flag("json") {
        let rows: Vec<serde_json::Value> = referrers
            .iter()
            .map(|p| {
                serde_json::json!({
                    "rank": p.referral.rank,
                    "id": p.id(),
                    "name": p.name(),
                    "referrals": p.referral.count,
                })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&rows)?);
        return Ok(());
    }

    if referrers.is_empty() {
        println!("No referrals yet.");
        return Ok(());
    }
    for profile in referrers {
        println!(
            "{:>3}. {} ({} referrals)",
            profile.referral.rank.unwrap_or_default(),
            profile.name(),
            profile.referral.count
        );
    }
    Ok(())
}

fn show_command(directory: &Directory, matches: &ArgMatches) -> Result<()> {
    let name = required(matches, "name")?;
    let found = directory.find_by_name(name);
    if found.is_empty() {
        anyhow::bail!("No profile named '{}'", name);
    }

    if found.len() > 1 {
        println!(
            "Warning: {} profiles share this name. Check verified links before paying.",
            found.len()
        );
        println!();
    }

    let now = Utc::now();
    for profile in found {
        let p = &profile.profile;
        println!("{} (id {})", p.name, p.id);
        if let Some(display_name) = &p.display_name {
            println!("  display name:  {}", display_name);
        }
        println!("  slug:          {}", build_slug(p));
        println!("  address:       {}", p.address);
        println!("  trust:         {}", profile.verification.trust_tier);
        println!("  verifications: {}", profile.verification.score());
        println!("  verified:      {}", last_verified_label(p, now));
        match profile.referral.rank {
            Some(rank) => println!(
                "  referrals:     {} (rank #{})",
                profile.referral.count, rank
            ),
            None => println!("  referrals:     {}", profile.referral.count),
        }
        if let Some(referrer) = p.referred_by.as_deref().filter(|r| !r.is_empty()) {
            println!("  referred by:   {}", referrer);
        }
        for link in &p.links {
            let mark = if link.is_verified { "verified" } else { "unverified" };
            println!("  link:          {} ({})", link.url, mark);
        }
        println!();
    }
    Ok(())
}

fn suggest_command(directory: &Directory, matches: &ArgMatches) -> Result<()> {
    let text = required(matches, "text")?;
    let limit = matches.get_one::<usize>("limit").copied().unwrap_or(10);

    let suggestions = directory.suggest(text);
    if suggestions.is_empty() {
        println!("No suggestions.");
        return Ok(());
    }
    for profile in suggestions.into_iter().take(limit) {
        match &profile.profile.display_name {
            Some(display_name) => println!("{} ({})", profile.name(), display_name),
            None => println!("{}", profile.name()),
        }
    }
    Ok(())
}
