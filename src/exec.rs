use std::{
    ffi::OsString,
    path::{Path, PathBuf},
    process::Output,
};

use futures::future::BoxFuture;

/// Runs external programs. Adapters only talk to the OS through this, so
/// tests can script the output of every command.
pub trait CommandRunner: Send + Sync + 'static {
    fn run<'a>(
        &'a self,
        program: &'a Path,
        args: &'a [&'a str],
    ) -> BoxFuture<'a, std::io::Result<Output>>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct TokioRunner;
impl CommandRunner for TokioRunner {
    fn run<'a>(
        &'a self,
        program: &'a Path,
        args: &'a [&'a str],
    ) -> BoxFuture<'a, std::io::Result<Output>> {
        Box::pin(async move {
            log::trace!("Running {} {args:?}", program.display());
            tokio::process::Command::new(program)
                .args(args)
                .stdin(std::process::Stdio::null())
                .stdout(std::process::Stdio::piped())
                .stderr(std::process::Stdio::piped())
                .kill_on_drop(true)
                .output()
                .await
        })
    }
}

const COMMON_PREFIXES: &[&str] = &["/opt/homebrew/bin", "/usr/local/bin", "/usr/bin"];

/// Finds executables the way a login shell would, even when the bar was
/// started from a launcher with a stripped-down `PATH`.
#[derive(Debug, Clone)]
pub struct BinaryResolver {
    prefixes: Vec<PathBuf>,
    search_path: Option<OsString>,
    fallback: Option<PathBuf>,
}
impl Default for BinaryResolver {
    fn default() -> Self {
        Self::new(
            COMMON_PREFIXES.iter().map(PathBuf::from).collect(),
            std::env::var_os("PATH"),
        )
    }
}
impl BinaryResolver {
    pub fn new(prefixes: Vec<PathBuf>, search_path: Option<OsString>) -> Self {
        Self {
            prefixes,
            search_path,
            fallback: Some(PathBuf::from("which")),
        }
    }
    /// Disables the `which` lookup that runs after the directory scan.
    pub fn without_fallback(mut self) -> Self {
        self.fallback = None;
        self
    }

    pub async fn resolve(&self, name: &str, runner: &dyn CommandRunner) -> Option<PathBuf> {
        let as_path = Path::new(name);
        if as_path.components().count() > 1 {
            return is_executable(as_path).then(|| as_path.to_owned());
        }

        let search_dirs = self.search_path.iter().flat_map(std::env::split_paths);
        if let Some(found) = self
            .prefixes
            .iter()
            .cloned()
            .chain(search_dirs)
            .map(|dir| dir.join(name))
            .find(|candidate| is_executable(candidate))
        {
            return Some(found);
        }

        let fallback = self.fallback.as_deref()?;
        let out = runner
            .run(fallback, &[name])
            .await
            .map_err(|err| log::debug!("{} {name} failed to run: {err}", fallback.display()))
            .ok()?;
        if !out.status.success() {
            return None;
        }
        let resolved = String::from_utf8_lossy(&out.stdout).trim().to_owned();
        (!resolved.is_empty()).then(|| PathBuf::from(resolved))
    }
}

fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt as _;
    std::fs::metadata(path).is_ok_and(|meta| meta.is_file() && meta.permissions().mode() & 0o111 != 0)
}

#[cfg(test)]
pub(crate) mod testing {
    use std::{
        collections::HashMap,
        os::unix::process::ExitStatusExt as _,
        path::Path,
        process::{ExitStatus, Output},
        sync::Mutex,
        time::Duration,
    };

    use futures::future::BoxFuture;

    use super::CommandRunner;
    use crate::utils::lock_mutex;

    #[derive(Clone, Debug)]
    pub enum Reply {
        Exit {
            code: i32,
            stdout: String,
            stderr: String,
        },
        Delayed(Duration, Box<Reply>),
        SpawnFailure,
    }
    impl Reply {
        pub fn ok(stdout: &str) -> Self {
            Self::Exit {
                code: 0,
                stdout: stdout.into(),
                stderr: String::new(),
            }
        }
        pub fn fail(code: i32, stderr: &str) -> Self {
            Self::Exit {
                code,
                stdout: String::new(),
                stderr: stderr.into(),
            }
        }
        pub fn after(self, delay: Duration) -> Self {
            Self::Delayed(delay, Box::new(self))
        }
    }

    /// Replies are looked up by `"<program file name> <args...>"`, then by the
    /// program file name alone. Unknown commands fail to spawn.
    #[derive(Default)]
    pub struct ScriptedRunner {
        replies: Mutex<HashMap<String, Reply>>,
        calls: Mutex<Vec<String>>,
    }
    impl ScriptedRunner {
        pub fn new() -> Self {
            Self::default()
        }
        pub fn on(self, key: &str, reply: Reply) -> Self {
            self.set(key, reply);
            self
        }
        pub fn set(&self, key: &str, reply: Reply) {
            lock_mutex(&self.replies).insert(key.to_owned(), reply);
        }
        pub fn calls(&self) -> Vec<String> {
            lock_mutex(&self.calls).clone()
        }
        pub fn count(&self, prefix: &str) -> usize {
            lock_mutex(&self.calls)
                .iter()
                .filter(|call| call.starts_with(prefix))
                .count()
        }
    }
    impl CommandRunner for ScriptedRunner {
        fn run<'a>(
            &'a self,
            program: &'a Path,
            args: &'a [&'a str],
        ) -> BoxFuture<'a, std::io::Result<Output>> {
            let name = program
                .file_name()
                .map(|it| it.to_string_lossy().into_owned())
                .unwrap_or_default();
            let key = std::iter::once(name.as_str())
                .chain(args.iter().copied())
                .collect::<Vec<_>>()
                .join(" ");
            lock_mutex(&self.calls).push(key.clone());
            let reply = {
                let replies = lock_mutex(&self.replies);
                replies.get(&key).or_else(|| replies.get(&name)).cloned()
            };
            Box::pin(async move {
                let mut reply = reply.ok_or_else(|| {
                    std::io::Error::new(std::io::ErrorKind::NotFound, format!("no reply for {key}"))
                })?;
                loop {
                    match reply {
                        Reply::Delayed(delay, inner) => {
                            tokio::time::sleep(delay).await;
                            reply = *inner;
                        }
                        Reply::SpawnFailure => {
                            break Err(std::io::Error::new(
                                std::io::ErrorKind::PermissionDenied,
                                "spawn failed",
                            ));
                        }
                        Reply::Exit {
                            code,
                            stdout,
                            stderr,
                        } => {
                            break Ok(Output {
                                status: ExitStatus::from_raw(code << 8),
                                stdout: stdout.into_bytes(),
                                stderr: stderr.into_bytes(),
                            });
                        }
                    }
                }
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{testing::*, *};

    fn make_exe(dir: &Path, name: &str) -> PathBuf {
        use std::os::unix::fs::PermissionsExt as _;
        let path = dir.join(name);
        std::fs::write(&path, "#!/bin/sh\n").unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    #[tokio::test]
    async fn prefixes_are_checked_before_search_path() {
        let prefix = tempfile::tempdir().unwrap();
        let on_path = tempfile::tempdir().unwrap();
        let expected = make_exe(prefix.path(), "aerospace");
        make_exe(on_path.path(), "aerospace");

        let resolver = BinaryResolver::new(
            vec![prefix.path().to_owned()],
            Some(on_path.path().as_os_str().to_owned()),
        );
        let found = resolver.resolve("aerospace", &ScriptedRunner::new()).await;
        assert_eq!(found, Some(expected));
    }

    #[tokio::test]
    async fn search_path_then_fallback() {
        let empty = tempfile::tempdir().unwrap();
        let on_path = tempfile::tempdir().unwrap();
        let expected = make_exe(on_path.path(), "aerospace");
        let search = std::env::join_paths([empty.path(), on_path.path()]).unwrap();

        let resolver = BinaryResolver::new(vec![], Some(search));
        let runner = ScriptedRunner::new();
        assert_eq!(resolver.resolve("aerospace", &runner).await, Some(expected));
        assert!(runner.calls().is_empty());

        let runner = ScriptedRunner::new().on("which aerospace", Reply::ok("/nix/bin/aerospace\n"));
        let resolver = BinaryResolver::new(vec![empty.path().to_owned()], None);
        assert_eq!(
            resolver.resolve("aerospace", &runner).await,
            Some(PathBuf::from("/nix/bin/aerospace"))
        );
    }

    #[tokio::test]
    async fn not_found_anywhere() {
        let empty = tempfile::tempdir().unwrap();
        let runner = ScriptedRunner::new().on("which aerospace", Reply::fail(1, ""));
        let resolver = BinaryResolver::new(vec![empty.path().to_owned()], None);
        assert_eq!(resolver.resolve("aerospace", &runner).await, None);

        let resolver = resolver.without_fallback();
        assert_eq!(resolver.resolve("aerospace", &runner).await, None);
        assert_eq!(runner.count("which"), 1);
    }

    #[tokio::test]
    async fn non_executable_files_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("aerospace"), "").unwrap();
        let resolver = BinaryResolver::new(vec![dir.path().to_owned()], None).without_fallback();
        assert_eq!(resolver.resolve("aerospace", &ScriptedRunner::new()).await, None);
    }
}
