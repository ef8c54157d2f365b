//! Log in, subscribe to server events and print them until Ctrl-C.
//!
//! Run with:
//!   cargo run --example event-loop -- 127.0.0.1:10011 serveradmin <password>
//!
//! Set `TS3QUERY_LOG=debug` for more detail and `TS3QUERY_LOG_FORMAT=json`
//! for machine-readable logs.

use std::env;

use tracing::level_filters::LevelFilter;
use ts3query::{connect, QueryBuilder, StopSignal};

#[derive(Copy, Clone, Debug)]
enum LogFormat {
    Text,
    Json,
}

fn init_logging(format: LogFormat, level: LevelFilter) {
    let builder = tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_max_level(level)
        .with_ansi(false)
        .with_target(false);

    match format {
        LogFormat::Text => {
            let _ = builder.try_init();
        }
        LogFormat::Json => {
            let _ = builder.json().try_init();
        }
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let format = match env::var("TS3QUERY_LOG_FORMAT").as_deref() {
        Ok("json") => LogFormat::Json,
        _ => LogFormat::Text,
    };
    let level = env::var("TS3QUERY_LOG")
        .ok()
        .and_then(|raw| raw.parse::<LevelFilter>().ok())
        .unwrap_or(LevelFilter::INFO);
    init_logging(format, level);

    let mut args = env::args().skip(1);
    let addr = args.next().unwrap_or_else(|| "127.0.0.1:10011".to_string());
    let user = args.next().unwrap_or_else(|| "serveradmin".to_string());
    let password = args.next().unwrap_or_default();

    let session = connect(&addr)?;
    session.execute(
        &QueryBuilder::new("login")
            .param("client_login_name", user.as_str())
            .param("client_login_password", password.as_str()),
    )?;
    session.execute(&QueryBuilder::new("use").param("sid", 1))?;
    session.execute(&QueryBuilder::new("servernotifyregister").param("event", "server"))?;

    let whoami = session.execute(&QueryBuilder::new("whoami"))?;
    if let Some(me) = whoami.first() {
        eprintln!(
            "Logged in as {} on virtual server {}",
            me.get("client_nickname").unwrap_or("?"),
            me.get("virtualserver_id").unwrap_or("?"),
        );
    }

    let stop = StopSignal::new();
    let on_interrupt = stop.clone();
    ctrlc::set_handler(move || on_interrupt.request_stop())?;

    session.run_events(&stop, |event| {
        let fields = event
            .first()
            .map(|record| {
                record
                    .iter()
                    .map(|(key, value)| format!("{key}={value}"))
                    .collect::<Vec<_>>()
                    .join(" ")
            })
            .unwrap_or_default();
        println!("{} {}", event.name(), fields);
    })?;

    session.close();
    Ok(())
}
