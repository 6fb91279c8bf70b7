use clap::Parser;
use std::ffi::OsString;

#[derive(Debug, Parser)]
#[command(author, version, about = "Run one of the bundled source connectors", long_about = None)]
pub struct Cli {
    /// List the bundled sources and exit
    #[arg(long)]
    pub list: bool,

    /// Source to run, e.g. `posthog`
    #[arg(required_unless_present = "list")]
    pub source: Option<String>,

    /// Forwarded to the source: spec | check | discover | read
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    pub args: Vec<OsString>,
}

impl Cli {
    /// The forwarded arguments with a program name in front, as the source
    /// entrypoint parses them.
    pub fn source_args(&self) -> Vec<OsString> {
        let program = format!("airsync {}", self.source.as_deref().unwrap_or_default());
        std::iter::once(OsString::from(program))
            .chain(self.args.iter().cloned())
            .collect()
    }
}
