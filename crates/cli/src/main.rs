use std::process::ExitCode;

fn main() -> ExitCode {
    cmdb_sync_cli::run()
}
