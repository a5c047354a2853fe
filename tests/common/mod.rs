use assert_cmd::Command;

/// The daemon binary with logging quietened and no `.env` or config file in scope.
pub fn guild_monitor_bin(workdir: &std::path::Path) -> Command {
    #[allow(deprecated)]
    let mut cmd =
        Command::cargo_bin("guild-monitor").expect("guild-monitor test binary should build");
    cmd.current_dir(workdir)
        .env("RUST_LOG", "error")
        .env_remove("GUILD_MONITOR_CONFIG");
    cmd
}
