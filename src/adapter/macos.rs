//! macOS feth adapter.
//!
//! A `fake ethernet` pair is created with ifconfig: `feth<N>` is what the
//! host configures and `feth<N+1024>` is its peer. Frames the host sends out
//! of `feth<N>` show up on the peer, where we capture them with BPF. Frames
//! from the tunnel are injected into the peer through an `AF_NDRV` socket.

use std::fs::OpenOptions;
use std::io;
use std::mem;
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd, RawFd};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use libc::{c_char, c_int, c_uint, c_ulong, c_void, AF_NDRV, SOCK_RAW};
use tokio::process::Command;
use tokio::sync::{mpsc, Mutex as AsyncMutex};
use tracing::{debug, info, warn};

use super::{parse_records, Adapter, FethPair, FrameBatch};
use crate::error::{Error, Result};

const IFCONFIG: &str = "/sbin/ifconfig";
const IPCONFIG: &str = "/usr/sbin/ipconfig";

const IFNAMSIZ: usize = 16;

/// Kernel buffer size requested with BIOCSBLEN; reads must use the same size.
const BPF_BUFFER_SIZE: usize = 131_072;

/// Highest BPF device index tried.
const BPF_DEVICE_MAX: u32 = 64;

/// Poll interval of the capture loop, bounds how long shutdown takes.
const CAPTURE_POLL_MS: c_int = 100;

/// Settle time between ifconfig steps.
const IFCONFIG_STEP_DELAY: Duration = Duration::from_micros(10);

const BIOCSBLEN: c_ulong = 0xc004_4266;
const BIOCPROMISC: c_ulong = 0x2000_4269;
const BIOCSETIF: c_ulong = 0x8020_426c;
const BIOCIMMEDIATE: c_ulong = 0x8004_4270;
const BIOCSHDRCMPLT: c_ulong = 0x8004_4275;
const BIOCSSEESENT: c_ulong = 0x8004_4277;

/// `struct sockaddr_ndrv` from `<net/ndrv.h>`.
#[repr(C)]
struct SockaddrNdrv {
    snd_len: u8,
    snd_family: u8,
    snd_name: [u8; IFNAMSIZ],
}

/// The part of `struct ifreq` BIOCSETIF reads.
#[repr(C)]
struct IfReq {
    ifr_name: [c_char; IFNAMSIZ],
    ifr_ifru: [u8; 16],
}

/// A feth pair driven through BPF capture and an NDRV socket.
pub struct FethAdapter {
    name: String,
    pair: FethPair,
    ndrv: OwnedFd,
    frames: AsyncMutex<mpsc::Receiver<Result<FrameBatch>>>,
    running: Arc<AtomicBool>,
    destroyed: AtomicBool,
}

impl FethAdapter {
    /// Create the pair, bring it up and start capturing on the peer.
    pub async fn create(pair: FethPair, mac: Option<&str>) -> Result<Self> {
        let name = pair.name();
        let peer = pair.peer();

        // Leftovers from an earlier run would make `create` fail.
        let _ = ifconfig(&[name.as_str(), "destroy"]).await;
        let _ = ifconfig(&[peer.as_str(), "destroy"]).await;

        let mut steps: Vec<Vec<&str>> = vec![
            vec![name.as_str(), "create"],
            vec![peer.as_str(), "create"],
            vec![name.as_str(), "peer", peer.as_str()],
        ];
        if let Some(mac) = mac {
            steps.push(vec![name.as_str(), "lladdr", mac]);
        }
        steps.push(vec![name.as_str(), "up"]);
        steps.push(vec![peer.as_str(), "up"]);

        for step in &steps {
            if let Err(e) = ifconfig(step).await {
                let _ = ifconfig(&[name.as_str(), "destroy"]).await;
                let _ = ifconfig(&[peer.as_str(), "destroy"]).await;
                return Err(e);
            }
            tokio::time::sleep(IFCONFIG_STEP_DELAY).await;
        }

        let opened = open_ndrv(&peer).and_then(|ndrv| Ok((ndrv, open_bpf(&peer)?)));
        let (ndrv, bpf) = match opened {
            Ok(fds) => fds,
            Err(e) => {
                let _ = ifconfig(&[name.as_str(), "destroy"]).await;
                let _ = ifconfig(&[peer.as_str(), "destroy"]).await;
                return Err(e);
            }
        };

        let running = Arc::new(AtomicBool::new(true));
        let (tx, rx) = mpsc::channel(16);
        spawn_capture(bpf, tx, running.clone());

        info!(adapter = %name, peer = %peer, "feth adapter ready");
        Ok(Self {
            name,
            pair,
            ndrv,
            frames: AsyncMutex::new(rx),
            running,
            destroyed: AtomicBool::new(false),
        })
    }

    pub fn pair(&self) -> &FethPair {
        &self.pair
    }
}

#[async_trait]
impl Adapter for FethAdapter {
    fn name(&self) -> &str {
        &self.name
    }

    async fn read(&self) -> Result<FrameBatch> {
        let mut frames = self.frames.lock().await;
        match frames.recv().await {
            Some(batch) => batch,
            None => Err(Error::ChannelClosed),
        }
    }

    async fn write(&self, batch: FrameBatch) -> Result<()> {
        if self.destroyed.load(Ordering::Acquire) {
            return Err(Error::ChannelClosed);
        }
        let fd = self.ndrv.as_raw_fd();
        for frame in &batch {
            let n = unsafe { libc::write(fd, frame.as_ptr() as *const c_void, frame.len()) };
            if n < 0 {
                return Err(Error::Io(io::Error::last_os_error()));
            }
        }
        Ok(())
    }

    async fn destroy(&self) {
        if self.destroyed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.running.store(false, Ordering::Release);
        for iface in [self.pair.name(), self.pair.peer()] {
            if let Err(e) = ifconfig(&[iface.as_str(), "destroy"]).await {
                warn!(adapter = %iface, "failed to destroy interface: {}", e);
            }
        }
        info!(adapter = %self.name, "feth adapter destroyed");
    }
}

/// Run `ipconfig set <name> dhcp`.
pub async fn invoke_dhcp(name: &str) -> Result<()> {
    run(IPCONFIG, &["set", name, "dhcp"]).await
}

async fn ifconfig(args: &[&str]) -> Result<()> {
    run(IFCONFIG, args).await
}

async fn run(program: &str, args: &[&str]) -> Result<()> {
    debug!("{} {}", program, args.join(" "));
    let output = Command::new(program).args(args).output().await?;
    if !output.status.success() {
        return Err(Error::adapter(format!(
            "{} {} failed: {}",
            program,
            args.join(" "),
            String::from_utf8_lossy(&output.stderr).trim()
        )));
    }
    Ok(())
}

fn name_bytes(iface: &str) -> Result<[u8; IFNAMSIZ]> {
    let raw = iface.as_bytes();
    if raw.len() >= IFNAMSIZ {
        return Err(Error::InvalidAdapterName(iface.to_string()));
    }
    let mut out = [0u8; IFNAMSIZ];
    out[..raw.len()].copy_from_slice(raw);
    Ok(out)
}

/// Open an NDRV socket bound and connected to `iface`.
fn open_ndrv(iface: &str) -> Result<OwnedFd> {
    let addr = SockaddrNdrv {
        snd_len: mem::size_of::<SockaddrNdrv>() as u8,
        snd_family: AF_NDRV as u8,
        snd_name: name_bytes(iface)?,
    };
    let addr_ptr = &addr as *const SockaddrNdrv as *const libc::sockaddr;
    let addr_len = mem::size_of::<SockaddrNdrv>() as libc::socklen_t;

    unsafe {
        let fd = libc::socket(AF_NDRV, SOCK_RAW, 0);
        if fd < 0 {
            return Err(Error::Io(io::Error::last_os_error()));
        }
        let fd = OwnedFd::from_raw_fd(fd);

        if libc::bind(fd.as_raw_fd(), addr_ptr, addr_len) < 0 {
            return Err(Error::adapter(format!(
                "bind ndrv socket to {iface}: {}",
                io::Error::last_os_error()
            )));
        }
        if libc::connect(fd.as_raw_fd(), addr_ptr, addr_len) < 0 {
            return Err(Error::adapter(format!(
                "connect ndrv socket to {iface}: {}",
                io::Error::last_os_error()
            )));
        }
        debug!(iface, "ndrv socket open");
        Ok(fd)
    }
}

/// Open the first free `/dev/bpfN` and attach it to `iface`.
fn open_bpf(iface: &str) -> Result<OwnedFd> {
    let mut last_err = None;
    for index in 1..BPF_DEVICE_MAX {
        let path = format!("/dev/bpf{index}");
        match OpenOptions::new().read(true).write(true).open(&path) {
            Ok(file) => {
                let fd = OwnedFd::from(file);
                configure_bpf(fd.as_raw_fd(), iface)?;
                debug!(device = %path, iface, "bpf attached");
                return Ok(fd);
            }
            Err(e) => last_err = Some(e),
        }
    }
    Err(Error::adapter(format!(
        "no bpf device available: {}",
        last_err.map(|e| e.to_string()).unwrap_or_default()
    )))
}

fn configure_bpf(fd: RawFd, iface: &str) -> Result<()> {
    let set_uint = |request: c_ulong, value: c_uint, what: &str| -> Result<()> {
        let mut value = value;
        if unsafe { libc::ioctl(fd, request, &mut value as *mut c_uint) } < 0 {
            return Err(Error::adapter(format!("{what}: {}", io::Error::last_os_error())));
        }
        Ok(())
    };

    set_uint(BIOCSBLEN, BPF_BUFFER_SIZE as c_uint, "BIOCSBLEN")?;
    set_uint(BIOCIMMEDIATE, 1, "BIOCIMMEDIATE")?;
    set_uint(BIOCSSEESENT, 0, "BIOCSSEESENT")?;

    let mut req = IfReq {
        ifr_name: [0; IFNAMSIZ],
        ifr_ifru: [0; 16],
    };
    for (dst, src) in req.ifr_name.iter_mut().zip(name_bytes(iface)?) {
        *dst = src as c_char;
    }
    if unsafe { libc::ioctl(fd, BIOCSETIF, &mut req as *mut IfReq) } < 0 {
        return Err(Error::adapter(format!(
            "BIOCSETIF {iface}: {}",
            io::Error::last_os_error()
        )));
    }

    set_uint(BIOCSHDRCMPLT, 1, "BIOCSHDRCMPLT")?;
    if unsafe { libc::ioctl(fd, BIOCPROMISC) } < 0 {
        return Err(Error::adapter(format!(
            "BIOCPROMISC: {}",
            io::Error::last_os_error()
        )));
    }
    Ok(())
}

/// Read BPF buffers on a blocking thread until `running` is cleared or the
/// receiver goes away.
fn spawn_capture(
    bpf: OwnedFd,
    tx: mpsc::Sender<Result<FrameBatch>>,
    running: Arc<AtomicBool>,
) {
    tokio::task::spawn_blocking(move || {
        let fd = bpf.as_raw_fd();
        let mut buf = vec![0u8; BPF_BUFFER_SIZE];
        let word = mem::size_of::<usize>();

        while running.load(Ordering::Acquire) {
            let mut pfd = libc::pollfd {
                fd,
                events: libc::POLLIN,
                revents: 0,
            };
            let ready = unsafe { libc::poll(&mut pfd, 1, CAPTURE_POLL_MS) };
            if ready < 0 {
                let err = io::Error::last_os_error();
                if err.kind() == io::ErrorKind::Interrupted {
                    continue;
                }
                let _ = tx.blocking_send(Err(Error::Io(err)));
                break;
            }
            if ready == 0 || pfd.revents & libc::POLLIN == 0 {
                continue;
            }

            let n = unsafe { libc::read(fd, buf.as_mut_ptr() as *mut c_void, buf.len()) };
            if n < 0 {
                let err = io::Error::last_os_error();
                if err.kind() == io::ErrorKind::Interrupted {
                    continue;
                }
                let _ = tx.blocking_send(Err(Error::Io(err)));
                break;
            }

            let batch = match parse_records(&buf[..n as usize], word) {
                Ok(batch) => batch,
                Err(e) => {
                    let _ = tx.blocking_send(Err(e));
                    break;
                }
            };
            if batch.is_empty() {
                continue;
            }
            if tx.blocking_send(Ok(batch)).is_err() {
                break;
            }
        }
        debug!("bpf capture stopped");
    });
}
