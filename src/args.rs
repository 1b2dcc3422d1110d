use std::net::{AddrParseError, IpAddr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::Parser;

#[derive(Parser, Debug)]
pub struct Args {
    /// The address cardtrack should listen on. By default
    /// cardtrack will listen just on the IPv4 loopback.
    #[arg(short, long, env = "CARDTRACK_ADDRESS")]
    address: Option<String>,

    /// The port cardtrack listens on.
    #[arg(short, long, env = "CARDTRACK_PORT", default_value_t = 3000)]
    port: u16,

    /// Where users and sessions are stored.
    #[arg(short, long, env = "CARDTRACK_DATA_DIR", default_value = ".")]
    data_dir: PathBuf,

    /// Secret used to sign and verify tokens.
    #[arg(long, env = "CARDTRACK_JWT_SECRET", hide_env_values = true)]
    jwt_secret: String,

    /// Lifetime of access tokens, in seconds.
    #[arg(long, env = "CARDTRACK_ACCESS_TTL", default_value_t = 60 * 60)]
    access_ttl: u64,

    /// Lifetime of refresh tokens, in seconds.
    #[arg(long, env = "CARDTRACK_REFRESH_TTL", default_value_t = 30 * 24 * 60 * 60)]
    refresh_ttl: u64,
}

impl Args {
    pub fn addr(&self) -> Result<SocketAddr, AddrParseError> {
        self.address
            .as_deref()
            .unwrap_or("127.0.0.1")
            .parse()
            .map(|addr: IpAddr| (addr, self.port).into())
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn jwt_secret(&self) -> &[u8] {
        self.jwt_secret.as_bytes()
    }

    pub fn access_ttl(&self) -> Duration {
        Duration::from_secs(self.access_ttl)
    }

    pub fn refresh_ttl(&self) -> Duration {
        Duration::from_secs(self.refresh_ttl)
    }
}
