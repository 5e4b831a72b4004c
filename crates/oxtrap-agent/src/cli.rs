/// Config file used when no path is given on the command line.
pub const DEFAULT_CONFIG_PATH: &str = "config/oxtrap.toml";

pub const USAGE: &str = "\
Usage:
  oxtrap [config.toml]                  Run all rules until interrupted
  oxtrap check-config <config.toml>     Validate a configuration file
  oxtrap --help | -h                    Print this help
  oxtrap --version | -V                 Print version
";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Run { config_path: String },
    CheckConfig { config_path: String },
    Help,
    Version,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum UsageError {
    #[error("check-config requires a <config.toml> argument")]
    MissingConfigPath,

    #[error("unknown option '{0}'")]
    UnknownOption(String),

    #[error("unexpected argument '{0}'")]
    UnexpectedArgument(String),
}

impl Command {
    /// Parses the arguments that follow the program name.
    pub fn parse<I>(args: I) -> Result<Self, UsageError>
    where
        I: IntoIterator<Item = String>,
    {
        let mut args = args.into_iter();
        let command = match args.next().as_deref() {
            None => Command::Run {
                config_path: DEFAULT_CONFIG_PATH.to_string(),
            },
            Some("check-config") => match args.next() {
                Some(path) if !path.starts_with('-') => Command::CheckConfig { config_path: path },
                Some(flag) => return Err(UsageError::UnknownOption(flag)),
                None => return Err(UsageError::MissingConfigPath),
            },
            Some("--help" | "-h") => Command::Help,
            Some("--version" | "-V") => Command::Version,
            Some(flag) if flag.starts_with('-') => {
                return Err(UsageError::UnknownOption(flag.to_string()))
            }
            Some(path) => Command::Run {
                config_path: path.to_string(),
            },
        };

        match args.next() {
            Some(extra) => Err(UsageError::UnexpectedArgument(extra)),
            None => Ok(command),
        }
    }
}
