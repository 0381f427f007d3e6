use std::fs::{self, File, OpenOptions};
use std::marker::PhantomData;
use std::os::fd::AsFd;
use std::path::{Path, PathBuf};

use log::{debug, error};
use nix::mount::{mount, umount2, MntFlags, MsFlags};
use nix::sched::{setns, unshare, CloneFlags};

use crate::error::{ErrorWrap, OverlayError, OverlayResult};
use crate::wrap;

// per-thread path: setns and unshare act on the calling thread, and
// /proc/self would name the main thread's namespace instead
const SELF_NS_PATH: &str = "/proc/thread-self/ns/net";

/// A network namespace identified by the file its netns is bind-mounted on.
///
/// setns(2) binds the namespace to the calling thread, so a handle must stay
/// on the thread that uses it; the raw-pointer marker keeps it `!Send`.
#[derive(Debug)]
pub struct Namespace {
    path: PathBuf,
    _not_send: PhantomData<*mut ()>,
}

impl Namespace {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Namespace {
            path: path.into(),
            _not_send: PhantomData,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Open the namespace file, suitable as a setns(2) or IFLA_NET_NS_FD
    /// target. Propagates not-exist when the bind mount is gone.
    pub fn open(&self) -> OverlayResult<File> {
        wrap!(
            File::open(&self.path),
            format!("open {}", self.path.display())
        )
    }

    /// Enter the namespace, run the callback with the namespace file, and
    /// restore the previous namespace on every exit path, panics included.
    ///
    /// All netlink traffic against a foreign namespace must go through here;
    /// a netlink socket talks to the namespace it was created in, so the
    /// callback has to open its own socket.
    pub fn execute<T, F>(&self, callback: F) -> OverlayResult<T>
    where
        F: FnOnce(&File) -> OverlayResult<T>,
    {
        let host = wrap!(File::open(SELF_NS_PATH), "open host netns")?;
        let target = self.open()?;

        setns(target.as_fd(), CloneFlags::CLONE_NEWNET)
            .map_err(OverlayError::from)
            .wrap(format!("setns {}", self.path.display()))?;
        let _guard = RestoreGuard { orig: &host };

        callback(&target)
    }

    /// Unmount the namespace bind mount and remove the file.
    pub fn destroy(&self) -> OverlayResult<()> {
        debug!("destroying namespace {}", self.path.display());
        umount2(&self.path, MntFlags::MNT_DETACH)
            .map_err(OverlayError::from)
            .wrap(format!("unmount {}", self.path.display()))?;
        wrap!(
            fs::remove_file(&self.path),
            format!("remove {}", self.path.display())
        )
    }
}

struct RestoreGuard<'a> {
    orig: &'a File,
}

impl Drop for RestoreGuard<'_> {
    fn drop(&mut self) {
        // A thread stranded in the wrong namespace must not keep running
        // netlink calls; there is no way to return an error from here.
        if let Err(err) = setns(self.orig.as_fd(), CloneFlags::CLONE_NEWNET) {
            error!("failed to restore previous network namespace: {err}");
        }
    }
}

/// A directory of named, bind-mounted network namespaces.
///
/// Creation uses exclusive-create semantics on the backing file, which is
/// what keeps two concurrent first-attaches for a VNI from both building
/// the sandbox.
pub struct Repository {
    root: PathBuf,
}

impl Repository {
    pub fn new<P: Into<PathBuf>>(root: P) -> OverlayResult<Repository> {
        let root = root.into();
        wrap!(
            fs::create_dir_all(&root),
            format!("create repository directory {}", root.display())
        )?;
        Ok(Repository { root })
    }

    /// Return the namespace for an existing entry, or the underlying
    /// not-exist error.
    pub fn get(&self, name: &str) -> OverlayResult<Namespace> {
        let path = self.root.join(name);
        wrap!(File::open(&path), format!("open {}", path.display()))?;
        Ok(Namespace::new(path))
    }

    /// Create a fresh network namespace bind-mounted on a new entry.
    ///
    /// The file is created with O_EXCL, then the calling thread unshares a
    /// new network namespace, bind-mounts its own /proc/thread-self/ns/net
    /// onto the file and moves back. The entry never touches /var/run/netns,
    /// so it stays invisible to `ip netns list`.
    pub fn create(&self, name: &str) -> OverlayResult<Namespace> {
        let path = self.root.join(name);
        wrap!(
            OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&path),
            format!("create {}", path.display())
        )?;

        debug!("creating namespace {}", path.display());
        let host = match File::open(SELF_NS_PATH) {
            Ok(f) => f,
            Err(err) => {
                let _ = fs::remove_file(&path);
                return Err(OverlayError::wrap("open host netns", err.into()));
            }
        };

        if let Err(err) = unshare(CloneFlags::CLONE_NEWNET) {
            let _ = fs::remove_file(&path);
            return Err(OverlayError::wrap(
                "unshare network namespace",
                err.into(),
            ));
        }

        // from here the thread sits in the new namespace; the thread-self
        // path resolves to it until we setns back
        let mounted = mount(
            Some(SELF_NS_PATH),
            &path,
            None::<&str>,
            MsFlags::MS_BIND,
            None::<&str>,
        );

        setns(host.as_fd(), CloneFlags::CLONE_NEWNET)
            .map_err(OverlayError::from)
            .wrap("restore host netns")?;

        if let Err(err) = mounted {
            let _ = fs::remove_file(&path);
            return Err(OverlayError::wrap(
                format!("bind mount namespace onto {}", path.display()),
                err.into(),
            ));
        }

        Ok(Namespace::new(path))
    }
}
