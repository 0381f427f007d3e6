// Kernel-facing tests unshare a fresh network namespace per test thread and
// are skipped without root, the same way the netlink tests gate themselves.

macro_rules! test_setup {
    () => {
        if !nix::unistd::getuid().is_root() {
            // there is no actual way to mark a test as skipped
            // https://internals.rust-lang.org/t/pre-rfc-skippable-tests/14611
            eprintln!("test skipped, requires root");
            return;
        }
        nix::sched::unshare(nix::sched::CloneFlags::CLONE_NEWNET).expect("unshare(CLONE_NEWNET)");
    };
}

macro_rules! run_command {
    ($command:expr  $(, $args:expr)*) => {
        std::process::Command::new($command).args([$($args),*]).output()
            .expect("failed to run command")
    };
}

mod config;
mod netns;
