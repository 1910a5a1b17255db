// passwd is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// passwd is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with passwd.  If not, see <http://www.gnu.org/licenses/>.

use passwd::file::FileConfig;
use passwd::registry::{BackendConfig, Registry};
use passwd::{change_password, Dependencies, PasswdError, PasswdResult, DEFAULT_TIMEOUT};

#[cfg(any(feature = "db", feature = "sqlite"))]
use passwd::sql::SqlConfig;

use clap::Parser;
use clap_verbosity_flag::{Verbosity, WarnLevel};
use log::{debug, error, info};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::env;
use std::fs::File;
use std::io::prelude::*;
use std::path::Path;
use std::time::Duration;

const MYNAME: &str = clap::crate_name!();

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    configured: bool,
    default_backend: Option<String>,
    /// Network timeout in seconds
    timeout: Option<u64>,
    #[serde(default)]
    backends: BTreeMap<String, BackendConfig>,
}

impl Default for Config {
    fn default() -> Self {
        #[cfg(any(feature = "db", feature = "sqlite"))]
        let (name, backend) = (
            String::from("sql"),
            BackendConfig::Sql(SqlConfig::default()),
        );
        #[cfg(not(any(feature = "db", feature = "sqlite")))]
        let (name, backend) = (
            String::from("file"),
            BackendConfig::File(FileConfig::default()),
        );

        let mut backends = BTreeMap::from([(name.clone(), backend)]);
        if name != "file" {
            backends.insert(String::from("file"), BackendConfig::File(FileConfig::default()));
        }

        Self {
            configured: false,
            default_backend: Some(name),
            timeout: Some(DEFAULT_TIMEOUT.as_secs()),
            backends,
        }
    }
}

impl Config {
    /// Returns the backend to use, the one given or the configured default
    fn backend_name(&self, requested: Option<String>) -> PasswdResult<String> {
        if let Some(name) = requested.or_else(|| self.default_backend.clone()) {
            return Ok(name);
        }
        match (self.backends.len(), self.backends.keys().next()) {
            (1, Some(name)) => Ok(name.clone()),
            _ => Err(PasswdError::Config(String::from(
                "no backend selected and no default_backend configured",
            ))),
        }
    }
}

fn print_example_config() -> PasswdResult<()> {
    let config = Config::default();
    let toml = toml::to_string_pretty(&config)
        .map_err(|err| PasswdError::Config(format!("unable to render example config: {err}")))?;
    println!("{toml}");
    Ok(())
}

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
/// Changes the password of a user on the configured backend
///
/// Username, old and new password are read from stdin, separated by NUL bytes.
struct Args {
    #[arg(short, long, help = "backend to change the password on")]
    backend: Option<String>,
    #[arg(short, long, default_value_t = false, help = "list configured backends")]
    list_backends: bool,
    #[arg(short, long, default_value_t = false, help = "print example config")]
    print_example_config: bool,
    #[command(flatten)]
    verbose: Verbosity<WarnLevel>,
}

fn read_config_file<P: AsRef<Path>>(path: P) -> PasswdResult<Config> {
    let path = path.as_ref();
    debug!("parse config file {}", path.display());
    let mut content = String::new();
    File::open(path)
        .and_then(|mut file| file.read_to_string(&mut content))
        .map_err(|err| PasswdError::Config(format!("{}: {err}", path.display())))?;
    Ok(toml::from_str(&content)?)
}

/// Splits `username NUL old NUL new`, a trailing newline is ignored
fn parse_credentials(input: &[u8]) -> PasswdResult<(String, String, String)> {
    let input = input
        .strip_suffix(b"\n")
        .map(|input| input.strip_suffix(b"\r").unwrap_or(input))
        .unwrap_or(input);
    let fields = input
        .split(|c| *c == 0)
        .map(|field| String::from_utf8(field.to_vec()))
        .collect::<Result<Vec<_>, _>>()
        .map_err(|_| PasswdError::Config(String::from("credentials are not valid utf-8")))?;
    match <[String; 3]>::try_from(fields) {
        Ok([username, old_password, new_password]) => Ok((username, old_password, new_password)),
        Err(fields) => Err(PasswdError::Config(format!(
            "expected 3 NUL separated fields on stdin, got {}",
            fields.len()
        ))),
    }
}

fn run(args: Args, config: Config) -> PasswdResult<()> {
    let deps = Dependencies::with_timeout(
        config
            .timeout
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_TIMEOUT),
    );
    let name = config.backend_name(args.backend)?;
    let registry = Registry::new(config.backends);
    let mut driver = registry.driver(&name, &deps)?;

    let mut input = Vec::new();
    std::io::stdin().read_to_end(&mut input)?;
    let (username, old_password, new_password) = parse_credentials(&input)?;

    info!("change password of user {username} on backend {name}");
    change_password(driver.as_mut(), &username, &old_password, &new_password)
}

fn main() {
    let binary_name = env::current_exe()
        .ok()
        .and_then(|e| e.file_name().and_then(|n| n.to_str().map(|s| s.to_owned())))
        .unwrap_or(String::from(MYNAME));

    let args = Args::parse();

    env_logger::builder()
        .format_timestamp(None)
        .filter_level(args.verbose.log_level_filter())
        .init();

    if args.print_example_config {
        let rc = match print_example_config() {
            Ok(()) => 0,
            Err(err) => {
                error!("{err}");
                err.exit_code()
            }
        };
        std::process::exit(rc);
    }

    let path = env::var("PASSWD_CONFIG").unwrap_or(format!("/etc/{binary_name}.toml"));

    let config = read_config_file(&path).unwrap_or_else(|err| {
        error!("config file: {path}: {err}");
        std::process::exit(err.exit_code());
    });

    if !config.configured {
        error!("{MYNAME} is not configured");
        std::process::exit(passwd::EXIT_CONFIG);
    }

    if args.list_backends {
        for (name, backend) in config.backends.iter() {
            println!("{name} ({})", backend.driver_name());
        }
        std::process::exit(0);
    }

    let rc = match run(args, config) {
        Ok(()) => 0,
        Err(err) => {
            error!("{err}");
            err.exit_code()
        }
    };

    std::process::exit(rc);
}
