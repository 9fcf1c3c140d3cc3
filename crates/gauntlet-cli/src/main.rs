mod smoke;

fn main() -> color_eyre::Result<()> {
    color_eyre::install()?;
    gauntlet_cli::init_logging();

    let code = gauntlet_cli::run_registered_tests()?;
    std::process::exit(code);
}
