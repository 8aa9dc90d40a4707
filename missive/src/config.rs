use std::net::SocketAddr;
use std::path::PathBuf;

use clap::Args;

pub const DEFAULT_HTTP_ADDR: &str = "0.0.0.0:3000";
pub const DEFAULT_RELAY_ADDR: &str = "127.0.0.1:5000";
pub const DEFAULT_STORAGE_PATH: &str = "storage/data.json";
pub const DEFAULT_PUBLIC_DIR: &str = "public";
pub const DEFAULT_ASSETS: [&str; 2] = ["style.css", "logo.png"];
/// Larger datagrams are cut off by the receive call.
pub const DEFAULT_DATAGRAM_BUFFER: usize = 1024;

/// Settings shared by every binary in the workspace.
///
/// Each value can be given as a flag or through its `MISSIVE_*` environment
/// variable; `.env` files are loaded by the binaries before parsing.
#[derive(Debug, Clone, Args)]
pub struct Settings {
    /// Address the HTTP server listens on
    #[arg(long, env = "MISSIVE_HTTP_ADDR", default_value = DEFAULT_HTTP_ADDR)]
    pub http_addr: SocketAddr,

    /// Datagram address of the persistence server
    #[arg(long, env = "MISSIVE_RELAY_ADDR", default_value = DEFAULT_RELAY_ADDR)]
    pub relay_addr: SocketAddr,

    /// JSON file the messages are appended to
    #[arg(long, env = "MISSIVE_STORAGE", default_value = DEFAULT_STORAGE_PATH, value_name = "FILE")]
    pub storage: PathBuf,

    /// Directory holding index.html, message.html, error.html and the assets
    #[arg(long, env = "MISSIVE_PUBLIC_DIR", default_value = DEFAULT_PUBLIC_DIR, value_name = "DIR")]
    pub public_dir: PathBuf,

    /// Static file served verbatim under `/<name>`
    #[arg(
        long = "asset",
        env = "MISSIVE_ASSETS",
        value_delimiter = ',',
        default_values = DEFAULT_ASSETS,
        value_name = "NAME"
    )]
    pub assets: Vec<String>,

    /// Receive buffer size for incoming datagrams, in bytes
    #[arg(long, env = "MISSIVE_DATAGRAM_BUFFER", default_value_t = DEFAULT_DATAGRAM_BUFFER)]
    pub datagram_buffer: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            http_addr: SocketAddr::from(([0, 0, 0, 0], 3000)),
            relay_addr: SocketAddr::from(([127, 0, 0, 1], 5000)),
            storage: PathBuf::from(DEFAULT_STORAGE_PATH),
            public_dir: PathBuf::from(DEFAULT_PUBLIC_DIR),
            assets: DEFAULT_ASSETS.iter().map(|s| s.to_string()).collect(),
            datagram_buffer: DEFAULT_DATAGRAM_BUFFER,
        }
    }
}

#[cfg(test)]
#[derive(clap::Parser)]
struct TestCli {
    #[command(flatten)]
    settings: Settings,
}

#[test]
fn test_defaults_match_parsed_defaults() {
    use clap::Parser;

    let parsed = TestCli::try_parse_from(["missive"]).unwrap().settings;
    let default = Settings::default();

    assert_eq!(parsed.http_addr, default.http_addr);
    assert_eq!(parsed.relay_addr, default.relay_addr);
    assert_eq!(parsed.storage, default.storage);
    assert_eq!(parsed.assets, default.assets);
    assert_eq!(parsed.datagram_buffer, 1024);
}

#[test]
fn test_flags_override_defaults() {
    use clap::Parser;

    let parsed = TestCli::try_parse_from([
        "missive",
        "--relay-addr",
        "127.0.0.1:6000",
        "--asset",
        "app.js",
        "--asset",
        "img/logo.svg",
        "--datagram-buffer",
        "4096",
    ])
    .unwrap()
    .settings;

    assert_eq!(parsed.relay_addr, SocketAddr::from(([127, 0, 0, 1], 6000)));
    assert_eq!(parsed.assets, vec!["app.js", "img/logo.svg"]);
    assert_eq!(parsed.datagram_buffer, 4096);
}
