use std::process::ExitCode;

fn main() -> ExitCode {
    usage_watcher_lib::run()
}
