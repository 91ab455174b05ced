mod config;
mod i18n;
mod logger;
mod middleware;
mod network;
mod serve;
mod shutdown;
mod tls;

use actix_web::{
    http::header,
    middleware::{Compress, Condition, DefaultHeaders},
    web, App, HttpServer,
};
use actix_web_httpauth::middleware::HttpAuthentication;
use clap::{Arg, ArgAction, ArgMatches, Command};
use std::path::{Path, PathBuf};
use std::process::exit;
use std::time::Duration;

use crate::config::{AppConfig, ConfigLoader, ConfigStore, Overrides};
use crate::middleware::{auth, cors, rate_limit::Rate};
use crate::middleware::{AccessLog, BasicCredentials, LocaleNegotiation, RateLimit, RefererFilter};
use crate::network::{NetworkUtils, DEFAULT_HTTPS_PORT, DEFAULT_HTTP_PORT};
use crate::serve::{root::ServeRoot, FileServer};
use crate::shutdown::{ShutdownManager, DRAIN_TIMEOUT};
use crate::tls::CertSource;

const PKG_NAME: &str = env!("CARGO_PKG_NAME");
const PKG_VERSION: &str = env!("CARGO_PKG_VERSION");
const PKG_AUTHORS: &str = env!("CARGO_PKG_AUTHORS");
const PKG_LICENSE: &str = env!("CARGO_PKG_LICENSE");

fn server_signature() -> String {
    format!("{}/{}", PKG_NAME, PKG_VERSION)
}

/// Value-taking options and the configuration key each one sets.
const VALUE_OPTIONS: &[(&str, &str)] = &[
    ("host", "host"),
    ("port", "port"),
    ("wwwroot", "wwwroot"),
    ("read-timeout", "readtimeout"),
    ("write-timeout", "writetimeout"),
    ("https-port", "httpsport"),
    ("https-cert-file", "httpscertfile"),
    ("https-key-file", "httpskeyfile"),
    ("autoindex-time-format", "autoindextimeformat"),
    ("log-dir", "logdir"),
    ("rate-limiter", "ratelimiter"),
    ("speed-limiter", "speedlimiter"),
    ("user", "user"),
];

/// Flags, the configuration key they set and the value they set it to.
const FLAG_OPTIONS: &[(&str, &str, bool)] = &[
    ("enable-https", "enablehttps", true),
    ("gzip", "gzip", true),
    ("no-gzip", "gzip", false),
    ("autoindex-exact-size", "autoindexexactsize", true),
    ("preview-html", "previewhtml", true),
    ("no-preview-html", "previewhtml", false),
    ("referer-limiter", "refererlimiter", true),
    ("basic", "basic", true),
    ("follow-symlinks", "followsymlinks", true),
    ("no-etag", "etag", false),
];

fn build_cli() -> Command {
    Command::new(PKG_NAME)
        .version(PKG_VERSION)
        .author(PKG_AUTHORS)
        .about("Serve a directory over HTTP and HTTPS")
        .long_about("dirserve maps URL paths onto a local directory: files are served with conditional-request and range support, directories get an index page, and downloads can be bandwidth limited.\n\nSettings come from an optional JSON or YAML file, DIRSERVE_* environment variables and the flags below, in that order.")
        .args_conflicts_with_subcommands(true)
        .subcommand(Command::new("version").about("Print version, platform and license information"))
        .subcommand(Command::new("env").about("Print version and build environment information"))
        .arg(
            Arg::new("positional-wwwroot")
                .value_name("WWWROOT")
                .help("Directory to serve (overrides --wwwroot)"),
        )
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("Configuration file (.json, .yaml or .yml)"),
        )
        .arg(
            Arg::new("host")
                .short('H')
                .long("host")
                .value_name("ADDR")
                .help("Address to bind (default 0.0.0.0)"),
        )
        .arg(
            Arg::new("port")
                .short('P')
                .long("port")
                .value_name("PORT")
                .help("HTTP port (default: first free port from 8080)"),
        )
        .arg(
            Arg::new("wwwroot")
                .short('w')
                .long("wwwroot")
                .value_name("DIR")
                .help("Directory to serve (default .)"),
        )
        .arg(
            Arg::new("read-timeout")
                .long("read-timeout")
                .value_name("SECS")
                .help("Time allowed for a client to send request headers"),
        )
        .arg(
            Arg::new("write-timeout")
                .long("write-timeout")
                .value_name("SECS")
                .help("Time allowed for a client to disconnect cleanly"),
        )
        .arg(
            Arg::new("enable-https")
                .long("enable-https")
                .action(ArgAction::SetTrue)
                .help("Also serve HTTPS"),
        )
        .arg(
            Arg::new("https-port")
                .long("https-port")
                .value_name("PORT")
                .help("HTTPS port (default: first free port from 8443)"),
        )
        .arg(
            Arg::new("https-cert-file")
                .long("https-cert-file")
                .value_name("FILE")
                .help("PEM certificate chain; a self-signed one is generated when absent"),
        )
        .arg(
            Arg::new("https-key-file")
                .long("https-key-file")
                .value_name("FILE")
                .help("PEM private key (PKCS#8, PKCS#1 or SEC1)"),
        )
        .arg(
            Arg::new("gzip")
                .short('g')
                .long("gzip")
                .action(ArgAction::SetTrue)
                .conflicts_with("no-gzip")
                .help("Compress responses"),
        )
        .arg(
            Arg::new("no-gzip")
                .long("no-gzip")
                .action(ArgAction::SetTrue)
                .help("Never compress responses"),
        )
        .arg(
            Arg::new("autoindex-time-format")
                .long("autoindex-time-format")
                .value_name("FORMAT")
                .help("strftime format of the listing time column"),
        )
        .arg(
            Arg::new("autoindex-exact-size")
                .long("autoindex-exact-size")
                .action(ArgAction::SetTrue)
                .help("Show exact byte counts in listings"),
        )
        .arg(
            Arg::new("preview-html")
                .long("preview-html")
                .action(ArgAction::SetTrue)
                .conflicts_with("no-preview-html")
                .help("Serve index.html for directories"),
        )
        .arg(
            Arg::new("no-preview-html")
                .long("no-preview-html")
                .action(ArgAction::SetTrue)
                .help("Always list directories, even with an index.html"),
        )
        .arg(
            Arg::new("log-dir")
                .long("log-dir")
                .value_name("DIR")
                .help("Append access lines to DIR/access.log"),
        )
        .arg(
            Arg::new("rate-limiter")
                .long("rate-limiter")
                .value_name("RATE")
                .help("Requests per client IP, e.g. 100-M (periods S, M, H, D)"),
        )
        .arg(
            Arg::new("speed-limiter")
                .long("speed-limiter")
                .value_name("BYTES")
                .help("Bandwidth per download in bytes per second (0 = unlimited)"),
        )
        .arg(
            Arg::new("referer-limiter")
                .long("referer-limiter")
                .action(ArgAction::SetTrue)
                .help("Reject requests referred by other sites"),
        )
        .arg(
            Arg::new("basic")
                .long("basic")
                .action(ArgAction::SetTrue)
                .help("Require HTTP Basic authentication"),
        )
        .arg(
            Arg::new("user")
                .short('u')
                .long("user")
                .value_name("USER:PASSWORD")
                .help("Credentials for --basic (default admin:admin)"),
        )
        .arg(
            Arg::new("follow-symlinks")
                .long("follow-symlinks")
                .action(ArgAction::SetTrue)
                .help("Serve symlinks that point outside the served directory"),
        )
        .arg(
            Arg::new("no-etag")
                .long("no-etag")
                .action(ArgAction::SetTrue)
                .help("Do not send ETag headers"),
        )
        .arg(
            Arg::new("no-request-logging")
                .short('L')
                .long("no-request-logging")
                .action(ArgAction::SetTrue)
                .help("Do not print a console line per request"),
        )
        .arg(
            Arg::new("no-timestamps")
                .short('T')
                .long("no-timestamps")
                .action(ArgAction::SetTrue)
                .help("Disable timestamps in log messages"),
        )
}

/// Command-line settings as configuration overrides. The positional
/// directory is applied last so it wins over `--wwwroot`.
fn cli_overrides(matches: &ArgMatches) -> Overrides {
    let mut overrides = Overrides::new();

    for (arg, key) in VALUE_OPTIONS {
        if let Some(value) = matches.get_one::<String>(arg) {
            overrides.set(key, value);
        }
    }
    for (arg, key, value) in FLAG_OPTIONS {
        if matches.get_flag(arg) {
            overrides.set(key, value);
        }
    }
    if let Some(root) = matches.get_one::<String>("positional-wwwroot") {
        overrides.set("wwwroot", root);
    }

    overrides
}

fn version_text() -> String {
    format!(
        "{} {}\nos/arch: {}/{}\nlicense: {}\nauthors: {}",
        PKG_NAME,
        PKG_VERSION,
        std::env::consts::OS,
        std::env::consts::ARCH,
        PKG_LICENSE,
        PKG_AUTHORS
    )
}

fn env_text() -> String {
    let profile = if cfg!(debug_assertions) { "debug" } else { "release" };
    format!(
        "{}\nfamily: {}\nprofile: {}\nconfig mode: {}",
        version_text(),
        std::env::consts::FAMILY,
        profile,
        ConfigLoader::from_env().mode()
    )
}

/// Human-readable list of the optional pipeline stages that are switched on.
fn active_features(app: &AppConfig) -> Vec<String> {
    let mut features = Vec::new();
    if app.basic {
        features.push("basic auth".to_string());
    }
    if app.gzip {
        features.push("compression".to_string());
    }
    if app.referer_limiter {
        features.push("referer filter".to_string());
    }
    if !app.rate_limiter.is_empty() {
        features.push(format!("rate limit {}", app.rate_limiter));
    }
    if let Some(limit) = app.speed_limit() {
        features.push(format!("speed limit {} B/s", limit));
    }
    if app.follow_symlinks {
        features.push("follow symlinks".to_string());
    }
    if !app.etag {
        features.push("no etag".to_string());
    }
    features
}

fn fail(message: &str) -> ! {
    logger::get_logger().error(message);
    exit(1)
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    let matches = build_cli().get_matches();
    match matches.subcommand_name() {
        Some("version") => {
            println!("{}", version_text());
            return Ok(());
        }
        Some("env") => {
            println!("{}", env_text());
            return Ok(());
        }
        _ => {}
    }

    env_logger::init_from_env(
        env_logger::Env::new().default_filter_or(format!("{}=info", PKG_NAME)),
    );

    let loader = ConfigLoader::from_env();
    let cli = cli_overrides(&matches);
    let custom_config = matches.get_one::<String>("config").map(PathBuf::from);
    let loaded = match loader.load(custom_config.as_deref(), &cli) {
        Ok(loaded) => loaded,
        Err(e) => fail(&format!("Configuration error: {}", e)),
    };
    let app = loaded.app.clone();

    let mut app_logger = logger::Logger::new()
        .with_request_logging(!matches.get_flag("no-request-logging"))
        .with_timestamps(!matches.get_flag("no-timestamps"));
    if !app.log_dir.is_empty() {
        app_logger = match app_logger.with_access_log_dir(Path::new(&app.log_dir)) {
            Ok(with_file) => with_file,
            Err(e) => fail(&format!("Cannot open access log in {}: {}", app.log_dir, e)),
        };
    }
    logger::init_logger(app_logger);
    let app_logger = logger::get_logger();

    app_logger.startup_info(PKG_NAME, PKG_VERSION, PKG_AUTHORS);
    if !loaded.version.is_empty() {
        app_logger.info(&format!("Configuration version {}", loaded.version));
    }

    let serve_root = match ServeRoot::new(app.www_root_path()) {
        Ok(root) => root,
        Err(e) => fail(&format!("Cannot serve {}: {}", app.www_root_path().display(), e)),
    };

    let rate = if app.rate_limiter.is_empty() {
        None
    } else {
        match Rate::parse(&app.rate_limiter) {
            Ok(rate) => Some(rate),
            Err(e) => fail(&format!("Configuration error: {}", e)),
        }
    };

    let host = app.bind_host().to_string();
    let http_port = match NetworkUtils::resolve_port(&host, &app.port, DEFAULT_HTTP_PORT) {
        Ok(port) => port,
        Err(e) => fail(&e),
    };

    let https = if app.enable_https {
        let https_port =
            match NetworkUtils::resolve_port(&host, &app.https_port, DEFAULT_HTTPS_PORT) {
                Ok(port) => port,
                Err(e) => fail(&e),
            };
        let source = match CertSource::from_settings(
            &app.https_cert_file,
            &app.https_key_file,
            &app.host,
        ) {
            Ok(source) => source,
            Err(e) => fail(&format!("SSL configuration error: {}", e)),
        };
        if source.is_self_signed() {
            app_logger.warn("No certificate configured, using a generated self-signed one");
        }
        match source.load_server_config() {
            Ok(tls_config) => Some((https_port, tls_config)),
            Err(e) => fail(&format!("Failed to load TLS configuration: {}", e)),
        }
    } else {
        None
    };

    let store = ConfigStore::new(app.clone());
    if let Some(source) = loaded.source.clone() {
        app_logger.info(&format!("Watching {} for changes", source.display()));
        config::watch(store.clone(), loader.clone(), source, cli.clone());
    }

    let file_server = web::Data::new(FileServer::new(serve_root, store));
    app_logger.info(&format!(
        "Serving {}",
        file_server.root().path().display()
    ));
    let features = active_features(&app);
    if !features.is_empty() {
        app_logger.info(&format!("Enabled: {}", features.join(", ")));
    }

    let credentials = app
        .credentials()
        .map(|(user, password)| BasicCredentials::new(user, password))
        .unwrap_or_else(|| BasicCredentials::new("", ""));
    let credentials = web::Data::new(credentials);
    let rate_limit = RateLimit::new(rate);
    let (basic, referer, gzip) = (app.basic, app.referer_limiter, app.gzip);

    let server = HttpServer::new(move || {
        App::new()
            .app_data(file_server.clone())
            .app_data(credentials.clone())
            .app_data(auth::challenge())
            .wrap(DefaultHeaders::new().add((header::SERVER, server_signature())))
            .wrap(Condition::new(gzip, Compress::default()))
            .wrap(rate_limit.clone())
            .wrap(LocaleNegotiation)
            .wrap(Condition::new(referer, RefererFilter))
            .wrap(cors::localhost_cors())
            .wrap(Condition::new(
                basic,
                HttpAuthentication::basic(auth::validate_credentials),
            ))
            .wrap(AccessLog)
            .default_service(web::to(serve::handle))
    })
    .client_request_timeout(Duration::from_secs(app.read_timeout))
    .client_disconnect_timeout(Duration::from_secs(app.write_timeout))
    .shutdown_timeout(DRAIN_TIMEOUT.as_secs());

    let mut urls = Vec::new();
    let server = match server.bind((host.as_str(), http_port)) {
        Ok(server) => server,
        Err(e) => fail(&format!("Cannot listen on {}:{}: {}", host, http_port, e)),
    };
    let addresses = NetworkUtils::create_server_addresses(&host, http_port, false);
    urls.push((addresses.local, addresses.network));

    let server = match https {
        Some((https_port, tls_config)) => {
            let addresses = NetworkUtils::create_server_addresses(&host, https_port, true);
            urls.push((addresses.local, addresses.network));
            match server.bind_rustls_0_23((host.as_str(), https_port), tls_config) {
                Ok(server) => server,
                Err(e) => fail(&format!("Cannot listen on {}:{}: {}", host, https_port, e)),
            }
        }
        None => server,
    };

    app_logger.server_info(&server_signature(), &urls);

    let server = server.run();
    let _shutdown = match ShutdownManager::install(server.handle()) {
        Ok(manager) => Some(manager),
        Err(e) => {
            app_logger.warn(&format!("Signal handling unavailable: {}", e));
            None
        }
    };

    server.await
}
