use clap::{Arg, Command};
use log::LevelFilter;
use member_gate::bot::{connect_store, connect_telegram, Bot};
use member_gate::store::record::header_row;
use member_gate::Config;
use std::process;

#[tokio::main]
async fn main() {
    let matches = Command::new("member-gate")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Membership-status enforcement for a Telegram group")
        .long_about(
            "member-gate keeps one status record per member in a Google Sheets worksheet\n\
             and removes group messages from members whose status does not allow posting.\n\
             Statuses are assigned by administrators editing the worksheet.",
        )
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("Configuration file path")
                .default_value("/etc/member-gate.yaml"),
        )
        .arg(
            Arg::new("generate-config")
                .long("generate-config")
                .value_name("FILE")
                .help("Generate a default configuration file")
                .action(clap::ArgAction::Set),
        )
        .arg(
            Arg::new("test-config")
                .long("test-config")
                .help("Validate configuration and check worksheet and Telegram access")
                .action(clap::ArgAction::SetTrue),
        )
        .arg(
            Arg::new("lookup")
                .long("lookup")
                .value_name("CHAT_ID")
                .help("Print the stored record for a chat id and exit")
                .action(clap::ArgAction::Set),
        )
        .arg(
            Arg::new("demo")
                .long("demo")
                .help("Run an offline demonstration against an in-memory worksheet")
                .action(clap::ArgAction::SetTrue),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .help("Enable debug logging")
                .action(clap::ArgAction::SetTrue),
        )
        .get_matches();

    let log_level = if matches.get_flag("verbose") {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };

    env_logger::Builder::from_default_env()
        .filter_level(log_level)
        .init();

    if let Some(generate_path) = matches.get_one::<String>("generate-config") {
        generate_default_config(generate_path);
        return;
    }

    let config_path = matches
        .get_one::<String>("config")
        .map(String::as_str)
        .unwrap_or("/etc/member-gate.yaml");

    let mut config = match load_config(config_path) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error loading configuration: {e}");
            process::exit(1);
        }
    };
    config.apply_env();

    if matches.get_flag("demo") {
        if let Err(e) = config.taxonomy.validate() {
            eprintln!("Invalid configuration: {e}");
            process::exit(1);
        }
        if let Err(e) = member_gate::demo::run(&config).await {
            eprintln!("Demo failed: {e}");
            process::exit(1);
        }
        return;
    }

    if matches.get_flag("test-config") {
        test_config(&config).await;
        return;
    }

    if let Some(chat_id) = matches.get_one::<String>("lookup") {
        lookup(&config, chat_id).await;
        return;
    }

    log::info!("Starting member-gate...");

    let bot = match Bot::new(config) {
        Ok(bot) => bot,
        Err(e) => {
            eprintln!("Configuration error: {e}");
            process::exit(1);
        }
    };
    if let Err(e) = bot.run().await {
        log::error!("Bot error: {e:#}");
        process::exit(1);
    }
}

fn load_config(path: &str) -> anyhow::Result<Config> {
    if std::path::Path::new(path).exists() {
        Config::from_file(path)
    } else {
        log::warn!("Configuration file '{path}' not found, using default configuration");
        Ok(Config::default())
    }
}

fn generate_default_config(path: &str) {
    let config = Config::default();
    match config.to_file(path) {
        Ok(()) => {
            println!("Default configuration written to: {path}");
            println!("Set BOT_TOKEN, SHEET_ID and GOOGLE_SERVICE_KEY, or fill in the file.");
        }
        Err(e) => {
            eprintln!("Error writing configuration file: {e}");
            process::exit(1);
        }
    }
}

async fn test_config(config: &Config) {
    println!("🔍 Testing configuration...");
    println!();

    if let Err(e) = config.validate() {
        println!("❌ Configuration validation failed:");
        println!("Error: {e}");
        process::exit(1);
    }
    println!("Worksheet: {}", config.store.worksheet);
    println!(
        "Taxonomy v{}: posting allowed for {}",
        config.taxonomy.version,
        config
            .taxonomy
            .allowed
            .iter()
            .map(|tier| config.taxonomy.label(*tier))
            .collect::<Vec<_>>()
            .join(", ")
    );

    let store = match connect_store(config) {
        Ok(store) => store,
        Err(e) => {
            println!("❌ Failed to set up worksheet access: {e}");
            process::exit(1);
        }
    };
    match store.header().await {
        Ok(header) => {
            println!("Header row: {}", header.join(" | "));
            let expected = header_row();
            if header.iter().map(|h| h.trim()).ne(expected.iter().map(String::as_str)) {
                println!("⚠️  Expected columns: {}", expected.join(" | "));
            }
        }
        Err(e) => {
            println!("❌ Worksheet is not reachable: {e}");
            process::exit(1);
        }
    }

    let telegram = match connect_telegram(config) {
        Ok(telegram) => telegram,
        Err(e) => {
            println!("❌ {e}");
            process::exit(1);
        }
    };
    match telegram.get_me().await {
        Ok(me) => println!(
            "Telegram bot: @{}",
            me.username.as_deref().unwrap_or_default()
        ),
        Err(e) => {
            println!("❌ Telegram rejected the bot token: {e}");
            process::exit(1);
        }
    }

    println!("✅ Configuration validated");
}

async fn lookup(config: &Config, chat_id: &str) {
    let store = match connect_store(config) {
        Ok(store) => store,
        Err(e) => {
            eprintln!("Configuration error: {e}");
            process::exit(1);
        }
    };

    match store.get_record(chat_id).await {
        Ok(Some(record)) => {
            println!("chat_id:    {}", record.chat_id);
            println!("username:   {}", record.username);
            println!("full_name:  {}", record.full_name);
            println!(
                "status:     {}",
                store.taxonomy().display(&record.status)
            );
            println!("created_at: {}", record.created_at);
            println!("updated_at: {}", record.updated_at);
        }
        Ok(None) => println!("No record for {chat_id} (status: Observer)"),
        Err(e) => {
            eprintln!("Lookup failed: {e}");
            process::exit(1);
        }
    }
}
