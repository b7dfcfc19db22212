pub mod setup;
pub mod submit;
pub mod utils;
pub mod watch;

use anyhow::Result;

use crate::cli::{Args, Commands};
use utils::load_config_with_logging;

/// Run the parsed command line
pub fn run_command(args: Args) -> Result<()> {
    let config_path = args.config.as_deref();
    let verbose = args.verbose;

    match args.command {
        Commands::Setup {
            base_url,
            endpoint,
            csrf_token,
            session_cookie,
            short_ms,
            long_ms,
        } => setup::setup(
            setup::SetupOptions {
                base_url,
                endpoint,
                csrf_token,
                session_cookie,
                short_ms,
                long_ms,
            },
            config_path,
            verbose,
        ),
        Commands::Watch { sort } => {
            let config = load_config_with_logging(config_path, verbose)?;
            watch::watch(config, sort)
        }
        Commands::CheckNow => {
            let config = load_config_with_logging(config_path, verbose)?;
            watch::check_now(&config)
        }
        Commands::Set {
            attr,
            value,
            old_password,
            url,
        } => {
            let config = load_config_with_logging(config_path, verbose)?;
            let input = utils::value_input(&value)?;
            submit::set(&config, &attr, &input, old_password.as_deref(), url.as_deref())
        }
        Commands::Create { fields, url } => {
            let config = load_config_with_logging(config_path, verbose)?;
            submit::create(&config, &fields, url.as_deref())
        }
        Commands::Delete => {
            let config = load_config_with_logging(config_path, verbose)?;
            submit::delete(&config)
        }
        Commands::ShowConfig => {
            let config = load_config_with_logging(config_path, verbose)?;
            setup::show_config(&config)
        }
    }
}
