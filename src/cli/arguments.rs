use anyhow::{Result, anyhow};
use clap::{Parser, Subcommand};
use devpx::config::secrets::placeholder_names;
use devpx::config::{Config, EnvSecrets, SecretSource};
use devpx::proxy::{Forward, ProxyRuleTable};
use hyper::header::{HeaderMap, HeaderName, HeaderValue};
use log::info;

#[derive(Parser, Debug, Clone)]
#[command(name = "devpx", about, author, version, long_about = None, propagate_version = true)]
pub struct DevpxArguments {
    #[arg(short = 'c', long = "config", help = "Path to the configuration file")]
    pub(crate) config_path: Option<String>,
    #[arg(short = 'v', long = "verbose", help = "Enable verbose logging")]
    pub(crate) verbose: bool,
    #[arg(short = 'l', long = "listen", help = "Address to listen on, overrides the config file (e.g. 127.0.0.1:5173)")]
    pub(crate) listen: Option<String>,
    #[arg(long = "static-dir", help = "Directory served for requests no rule matches, overrides the config file")]
    pub(crate) static_dir: Option<String>,
    #[command(subcommand)]
    pub(crate) command: Option<DevpxCommands>,
}

#[derive(Subcommand, Debug, Clone)]
pub enum DevpxCommands {
    #[clap(name = "rules", about = "Inspect proxy rules")]
    Rules {
        #[clap(subcommand)]
        command: RuleCommands,
    },
    #[clap(name = "config", about = "Manage the configuration file")]
    Config {
        #[clap(subcommand)]
        command: ConfigCommands,
    },
}

#[derive(Subcommand, Debug, Clone)]
pub enum RuleCommands {
    #[clap(name = "list", about = "List proxy rules in match order")]
    List,
    #[clap(name = "match", about = "Show where a request path would be forwarded")]
    Match {
        /// Request path including any query string (e.g. /api/festival/list?page=1)
        path: String,
        /// Request header as 'Name: value', may be repeated
        #[arg(short = 'H', long = "header")]
        headers: Vec<String>,
    },
}

#[derive(Subcommand, Debug, Clone)]
pub enum ConfigCommands {
    #[clap(name = "show", about = "Show the current configuration")]
    Show,
    #[clap(name = "init", about = "Write the default configuration file")]
    Init {
        /// Overwrite an existing file
        #[arg(short = 'f', long = "force")]
        force: bool,
    },
    #[clap(name = "show-path", about = "Show the path to the configuration file")]
    ShowPath,
}

// Dry runs still work before credentials are set up
struct DryRunSecrets(EnvSecrets);

impl SecretSource for DryRunSecrets {
    fn lookup(&self, name: &str) -> Option<String> {
        self.0.lookup(name).or_else(|| Some(format!("<unset {}>", name)))
    }
}

impl DevpxArguments {
    /// Run a subcommand if one was given. Returns true when the process should exit afterwards.
    pub async fn handle_arguments(&self) -> Result<bool> {
        let Some(command) = &self.command else {
            return Ok(false);
        };
        let effective_config_path = Config::resolve_config_path(self.config_path.clone());

        // `init` must not go through try_load, which would write the default itself
        if let DevpxCommands::Config { command: ConfigCommands::Init { force } } = command {
            let path = std::path::Path::new(&effective_config_path);
            if path.exists() && !force {
                return Err(anyhow!("{} already exists, use --force to overwrite", path.display()));
            }
            Config::save_default(path).await?;
            info!("Wrote default configuration to {}", path.display());
            return Ok(true);
        }

        let mut config = Config::try_load(&effective_config_path).await?;
        self.apply_overrides(&mut config);
        match command {
            // ---
            // Rules subcommand
            // ---
            DevpxCommands::Rules { command } => {
                let secrets = DryRunSecrets(EnvSecrets::load());
                let table = ProxyRuleTable::from_config(&config, &secrets)?;
                match command {
                    RuleCommands::List => {
                        for (index, rule) in table.rules().enumerate() {
                            println!(
                                "\x1b[1;36m{}\x1b[0m. \x1b[1;33m{}\x1b[0m -> \x1b[1;32m{}\x1b[0m ({})",
                                index + 1,
                                rule.get_prefix(),
                                rule.get_target(),
                                rule.get_rewrite()
                            );
                            let secrets: Vec<&str> = rule.get_headers().values().flat_map(|v| placeholder_names(v)).collect();
                            if !secrets.is_empty() {
                                println!("   secrets: {}", secrets.join(", "));
                            }
                        }
                    }
                    RuleCommands::Match { path, headers } => {
                        let headers = parse_headers(headers)?;
                        match table.forward(path, &headers) {
                            Forward::Upstream(upstream) => {
                                println!("\x1b[1;36m{}\x1b[0m", path);
                                println!("  rule     {}", upstream.prefix);
                                println!("  upstream \x1b[1;32m{}\x1b[0m", upstream.url());
                                println!("  tls      {}", if upstream.verify_tls { "verified" } else { "unverified" });
                                let names: Vec<&str> = upstream.headers.keys().map(|k| k.as_str()).collect();
                                println!("  headers  {}", names.join(", "));
                            }
                            Forward::NoMatch => {
                                println!("\x1b[1;36m{}\x1b[0m: no rule matches, served from {}", path, config.get_static_dir());
                            }
                        }
                    }
                }
            }

            // ---
            // Config subcommand
            // ---
            DevpxCommands::Config { command } => match command {
                ConfigCommands::Show => {
                    config.validate()?;
                    println!("{}", config);
                }
                ConfigCommands::ShowPath => {
                    println!("{}", config.get_path().to_string_lossy())
                }
                ConfigCommands::Init { .. } => {}
            },
        }
        Ok(true)
    }

    /// Apply command line overrides on top of the loaded file
    pub fn apply_overrides(&self, config: &mut Config) {
        if let Some(listen) = &self.listen {
            config.set_listen(listen.clone());
        }
        if let Some(static_dir) = &self.static_dir {
            config.set_static_dir(static_dir.clone());
        }
    }
}

/// Parse `Name: value` pairs given on the command line
fn parse_headers(raw: &[String]) -> Result<HeaderMap> {
    let mut headers = HeaderMap::new();
    for entry in raw {
        let (name, value) = entry.split_once(':').ok_or_else(|| anyhow!("Header must look like 'Name: value': {}", entry))?;
        headers.append(HeaderName::from_bytes(name.trim().as_bytes())?, HeaderValue::from_str(value.trim())?);
    }
    Ok(headers)
}
