//! Keeps third-party output off the protocol channel.
//!
//! whisper.cpp, GGML and ONNX Runtime are free to print to file descriptor 1.
//! While one of their calls runs, stdout is pointed at stderr; the protocol
//! writer owns a private duplicate of the original stdout taken at startup
//! and is not affected.

use std::io::{self, Write};

/// Scope in which third-party code may print freely.
///
/// Holding the guard keeps stdout diverted; dropping it restores stdout.
pub trait Segregator: Send {
    type Guard;

    fn isolate(&self) -> io::Result<Self::Guard>;
}

/// Diverts the process stdout to stderr.
#[derive(Debug, Default, Clone, Copy)]
pub struct StdioSegregator;

/// No redirection. Used where nothing can reach stdout anyway.
#[derive(Debug, Default, Clone, Copy)]
pub struct PassthroughSegregator;

impl Segregator for PassthroughSegregator {
    type Guard = ();

    fn isolate(&self) -> io::Result<()> {
        Ok(())
    }
}

/// Take the protocol channel: a duplicate of stdout as it is right now.
///
/// Must run before anything can redirect stdout.
#[cfg(unix)]
pub fn claim_protocol_stdout() -> io::Result<Box<dyn Write + Send>> {
    use std::os::fd::AsFd;

    let fd = io::stdout().as_fd().try_clone_to_owned()?;
    Ok(Box::new(std::fs::File::from(fd)))
}

#[cfg(not(unix))]
pub fn claim_protocol_stdout() -> io::Result<Box<dyn Write + Send>> {
    Ok(Box::new(io::stdout()))
}

#[cfg(unix)]
pub use unix::Redirect;

#[cfg(unix)]
impl Segregator for StdioSegregator {
    type Guard = Redirect;

    fn isolate(&self) -> io::Result<Redirect> {
        Redirect::install(io::stdout(), io::stderr())
    }
}

#[cfg(not(unix))]
impl Segregator for StdioSegregator {
    type Guard = ();

    fn isolate(&self) -> io::Result<()> {
        tracing::debug!("stdout redirection unsupported on this platform");
        let _ = io::stdout().flush();
        Ok(())
    }
}

#[cfg(unix)]
mod unix {
    use std::io::{self, Write};
    use std::os::fd::{AsFd, AsRawFd, OwnedFd, RawFd};

    use tracing::{debug, error};

    /// Points one descriptor at another until dropped.
    #[derive(Debug)]
    pub struct Redirect {
        victim: RawFd,
        saved: OwnedFd,
    }

    impl Redirect {
        /// Save `victim`, then make it refer to whatever `sink` refers to.
        ///
        /// `victim` must stay open for as long as the guard lives.
        pub fn install(victim: impl AsFd, sink: impl AsFd) -> io::Result<Self> {
            flush_stdio();

            let victim = victim.as_fd();
            let saved = victim.try_clone_to_owned()?;
            dup2(sink.as_fd().as_raw_fd(), victim.as_raw_fd())?;

            debug!(fd = victim.as_raw_fd(), "Descriptor redirected");
            Ok(Self {
                victim: victim.as_raw_fd(),
                saved,
            })
        }
    }

    impl Drop for Redirect {
        fn drop(&mut self) {
            // Anything still buffered belongs to the diverted scope.
            flush_stdio();

            if let Err(e) = dup2(self.saved.as_raw_fd(), self.victim) {
                error!(fd = self.victim, error = %e, "Failed to restore descriptor");
            }
        }
    }

    fn flush_stdio() {
        let _ = io::stdout().flush();
        // SAFETY: fflush(NULL) flushes every open C stream and takes no
        // pointers from us.
        unsafe {
            libc::fflush(std::ptr::null_mut());
        }
    }

    fn dup2(src: RawFd, dst: RawFd) -> io::Result<()> {
        loop {
            // SAFETY: both descriptors are open for the duration of the call;
            // dup2 does not take ownership of either.
            let rc = unsafe { libc::dup2(src, dst) };
            if rc != -1 {
                return Ok(());
            }
            let err = io::Error::last_os_error();
            if err.kind() != io::ErrorKind::Interrupted {
                return Err(err);
            }
        }
    }
}
