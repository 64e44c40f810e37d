//! Shared-memory channel.
//!
//! Two POSIX shared-memory objects back one channel: `<base>.seg` holds the
//! control block (inter-process mutex, condvar, turn flag, frame sidecar)
//! and `<base>.blk` holds the variable-size payload. The server creates and
//! finally unlinks both; clients open existing objects. Turn-taking is a
//! single `sender_flag`: a writer stamps its own side after publishing a
//! frame, and the receiver's wait predicate is `sender_flag != own_side`.
//!
//! When a frame outgrows the payload object the sender truncates it upward
//! and re-maps; `update_ptr_flag` tells the receiver to re-map its own view
//! before reading. Both flags are only ever written inside the mutex'd
//! send critical section; the receiver clears `update_ptr_flag` before it
//! touches the payload.

use super::codec::{MessageCodec, WireCodec};
use super::message::{Message, MessageTag};
use super::{Channel, INITIAL_PAYLOAD_CAPACITY, LOCK_TIMEOUT_MS};
use crate::error::ChannelError;

use nix::errno::Errno;
use nix::fcntl::OFlag;
use nix::sys::mman::{mmap, munmap, shm_open, shm_unlink, MapFlags, ProtFlags};
use nix::sys::stat::Mode;
use nix::unistd::ftruncate;

use std::ffi::c_void;
use std::num::NonZeroUsize;
use std::os::fd::{AsRawFd, OwnedFd};
use std::ptr::{addr_of, addr_of_mut, NonNull};
use std::sync::atomic::{AtomicU16, Ordering};
use tracing::{debug, warn};

/// Size of the control region. Far larger than the control block itself;
/// kept at one page-ish unit so offsets stay stable across builds.
const SEG_SIZE: usize = 1024;

const _: () = assert!(std::mem::size_of::<ControlBlock>() <= SEG_SIZE);

/// Which end of the channel this process is. The server owns the region
/// names: it creates them on connect and unlinks them on disconnect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Server,
    Client,
}

impl Side {
    fn flag(self) -> u8 {
        match self {
            Side::Server => 1,
            Side::Client => 0,
        }
    }
}

/// Control block living at offset 0 of `<base>.seg`.
///
/// All fields except `msg_tag` are read and written only under `mutex`;
/// `msg_tag` is additionally readable lock-free through an acquire load
/// so `peek` never blocks.
#[repr(C)]
struct ControlBlock {
    mutex: libc::pthread_mutex_t,
    cond: libc::pthread_cond_t,
    msg_tag: AtomicU16,
    msg_size: u32,
    peer_encoder_id: u32,
    sender_flag: u8,
    update_ptr_flag: u8,
}

/// Shared-memory implementation of [`Channel`].
pub struct ShmemChannel<C: MessageCodec = WireCodec> {
    codec: C,
    side: Side,
    seg_name: String,
    blk_name: String,
    connected: bool,
    seg_fd: Option<OwnedFd>,
    blk_fd: Option<OwnedFd>,
    ctrl: Option<NonNull<ControlBlock>>,
    blk: Option<NonNull<u8>>,
    blk_len: usize,
}

// The raw mappings are plain process-local addresses and the channel is
// driven from one thread at a time (spec: both peers are single-threaded
// with respect to the channel).
unsafe impl<C: MessageCodec + Send> Send for ShmemChannel<C> {}

impl ShmemChannel<WireCodec> {
    /// Server end over the reference codec.
    pub fn server(base_name: &str) -> Self {
        Self::with_codec(base_name, Side::Server, WireCodec)
    }

    /// Client end over the reference codec.
    pub fn client(base_name: &str) -> Self {
        Self::with_codec(base_name, Side::Client, WireCodec)
    }
}

impl<C: MessageCodec> ShmemChannel<C> {
    /// Channel over a custom codec. `base_name` selects the two
    /// shared-memory objects `<base>.seg` and `<base>.blk`.
    pub fn with_codec(base_name: &str, side: Side, codec: C) -> Self {
        let base = if base_name.starts_with('/') {
            base_name.to_string()
        } else {
            format!("/{base_name}")
        };
        Self {
            codec,
            side,
            seg_name: format!("{base}.seg"),
            blk_name: format!("{base}.blk"),
            connected: false,
            seg_fd: None,
            blk_fd: None,
            ctrl: None,
            blk: None,
            blk_len: 0,
        }
    }

    pub fn encoder_id(&self) -> u32 {
        self.codec.encoder_id()
    }

    fn ctrl_ptr(&self) -> Result<*mut ControlBlock, ChannelError> {
        self.ctrl
            .map(NonNull::as_ptr)
            .ok_or(ChannelError::Disconnected)
    }

    fn open_regions(&mut self) -> Result<(), ChannelError> {
        match self.side {
            Side::Server => {
                // a server that died abnormally leaves stale objects behind;
                // recreating is the recovery path
                let _ = shm_unlink(self.seg_name.as_str());
                let _ = shm_unlink(self.blk_name.as_str());

                let seg_fd = shm_open(
                    self.seg_name.as_str(),
                    OFlag::O_CREAT | OFlag::O_RDWR,
                    Mode::S_IRUSR | Mode::S_IWUSR,
                )?;
                ftruncate(&seg_fd, SEG_SIZE as libc::off_t)?;
                self.seg_fd = Some(seg_fd);

                let blk_fd = shm_open(
                    self.blk_name.as_str(),
                    OFlag::O_CREAT | OFlag::O_RDWR,
                    Mode::S_IRUSR | Mode::S_IWUSR,
                )?;
                ftruncate(&blk_fd, INITIAL_PAYLOAD_CAPACITY as libc::off_t)?;
                self.blk_fd = Some(blk_fd);
            }
            Side::Client => {
                let seg_fd = shm_open(self.seg_name.as_str(), OFlag::O_RDWR, Mode::empty())?;
                let blk_fd = shm_open(self.blk_name.as_str(), OFlag::O_RDWR, Mode::empty())?;
                // a server mid-creation has opened but not yet sized the
                // objects; mapping them now would fault on first access
                if object_size(&seg_fd)? < SEG_SIZE as u64
                    || object_size(&blk_fd)? < INITIAL_PAYLOAD_CAPACITY as u64
                {
                    return Err(ChannelError::Disconnected);
                }
                self.seg_fd = Some(seg_fd);
                self.blk_fd = Some(blk_fd);
            }
        }

        let seg_fd = self.seg_fd.as_ref().expect("seg fd just opened");
        let ctrl = unsafe {
            mmap(
                None,
                NonZeroUsize::new(SEG_SIZE).expect("nonzero segment size"),
                ProtFlags::PROT_READ | ProtFlags::PROT_WRITE,
                MapFlags::MAP_SHARED,
                seg_fd,
                0,
            )?
        };
        self.ctrl = Some(ctrl.cast());

        self.map_payload(INITIAL_PAYLOAD_CAPACITY)?;
        Ok(())
    }

    fn map_payload(&mut self, len: usize) -> Result<(), ChannelError> {
        let blk_fd = self.blk_fd.as_ref().ok_or(ChannelError::Disconnected)?;
        let blk = unsafe {
            mmap(
                None,
                NonZeroUsize::new(len).ok_or(ChannelError::Os(Errno::EINVAL))?,
                ProtFlags::PROT_READ | ProtFlags::PROT_WRITE,
                MapFlags::MAP_SHARED,
                blk_fd,
                0,
            )?
        };
        self.blk = Some(blk.cast());
        self.blk_len = len;
        Ok(())
    }

    fn unmap_payload(&mut self) {
        if let Some(blk) = self.blk.take() {
            unsafe {
                let _ = munmap(blk.cast::<c_void>(), self.blk_len);
            }
        }
        self.blk_len = 0;
    }

    fn remap_payload(&mut self, len: usize) -> Result<(), ChannelError> {
        self.unmap_payload();
        self.map_payload(len)
    }

    /// Grow the payload object and this side's view to `len` bytes.
    fn grow_payload(&mut self, len: usize) -> Result<(), ChannelError> {
        let blk_fd = self.blk_fd.as_ref().ok_or(ChannelError::Disconnected)?;
        ftruncate(blk_fd, len as libc::off_t)?;
        debug!(name = %self.blk_name, new_len = len, "payload region grown");
        self.remap_payload(len)
    }

    fn init_control(&self, ctrl: *mut ControlBlock) {
        unsafe {
            std::ptr::write_bytes(ctrl.cast::<u8>(), 0, std::mem::size_of::<ControlBlock>());

            let mut mattr: libc::pthread_mutexattr_t = std::mem::zeroed();
            libc::pthread_mutexattr_init(&mut mattr);
            libc::pthread_mutexattr_setpshared(&mut mattr, libc::PTHREAD_PROCESS_SHARED);
            libc::pthread_mutex_init(addr_of_mut!((*ctrl).mutex), &mattr);
            libc::pthread_mutexattr_destroy(&mut mattr);

            let mut cattr: libc::pthread_condattr_t = std::mem::zeroed();
            libc::pthread_condattr_init(&mut cattr);
            libc::pthread_condattr_setpshared(&mut cattr, libc::PTHREAD_PROCESS_SHARED);
            libc::pthread_condattr_setclock(&mut cattr, libc::CLOCK_MONOTONIC);
            libc::pthread_cond_init(addr_of_mut!((*ctrl).cond), &cattr);
            libc::pthread_condattr_destroy(&mut cattr);

            (*ctrl).peer_encoder_id = self.codec.encoder_id();
            // the server "sent last": clients speak first
            (*ctrl).sender_flag = Side::Server.flag();
        }
    }

    /// Publish one frame and hand the turn to the peer.
    fn send_frame(&mut self, tag: MessageTag, bytes: &[u8]) -> Result<(), ChannelError> {
        let ctrl = self.ctrl_ptr()?;
        unsafe {
            lock_timed(ctrl)?;

            (*ctrl).msg_tag.store(tag as u16, Ordering::Release);
            (*ctrl).msg_size = bytes.len() as u32;

            if bytes.len() > self.blk_len {
                if let Err(err) = self.grow_payload(bytes.len()) {
                    libc::pthread_mutex_unlock(addr_of_mut!((*ctrl).mutex));
                    return Err(err);
                }
                // the peer's view of the old, smaller object is stale now
                (*ctrl).update_ptr_flag = 1;
            }

            if !bytes.is_empty() {
                let dst = self.blk.ok_or(ChannelError::Disconnected)?.as_ptr();
                std::ptr::copy_nonoverlapping(bytes.as_ptr(), dst, bytes.len());
            }

            (*ctrl).sender_flag = self.side.flag();
            libc::pthread_mutex_unlock(addr_of_mut!((*ctrl).mutex));
            libc::pthread_cond_signal(addr_of_mut!((*ctrl).cond));
        }
        Ok(())
    }

    /// Borrow the pending frame. The returned window is only valid until
    /// the next channel operation; `pop_message` decodes it in place.
    fn frame_raw(&mut self) -> Result<(*const u8, usize), ChannelError> {
        if !self.connected {
            return Err(ChannelError::Disconnected);
        }
        let ctrl = self.ctrl_ptr()?;
        unsafe {
            if std::ptr::read_volatile(addr_of!((*ctrl).sender_flag)) == self.side.flag() {
                return Err(ChannelError::Empty);
            }

            let size = std::ptr::read_volatile(addr_of!((*ctrl).msg_size)) as usize;
            if std::ptr::read_volatile(addr_of!((*ctrl).update_ptr_flag)) != 0 {
                if size > self.blk_len {
                    self.remap_payload(size)?;
                }
                std::ptr::write_volatile(addr_of_mut!((*ctrl).update_ptr_flag), 0);
            }

            let base = self.blk.ok_or(ChannelError::Disconnected)?.as_ptr();
            Ok((base.cast_const(), size))
        }
    }
}

impl<C: MessageCodec> Channel for ShmemChannel<C> {
    fn connect(&mut self) -> Result<(), ChannelError> {
        if self.connected {
            self.disconnect();
        }

        if let Err(err) = self.open_regions() {
            self.disconnect();
            return Err(err);
        }

        let ctrl = self.ctrl_ptr()?;
        if self.side == Side::Server {
            self.init_control(ctrl);
        }

        // probing the lock catches a channel whose previous owner died
        // while holding it
        let probe = unsafe {
            lock_timed(ctrl).map(|()| {
                libc::pthread_mutex_unlock(addr_of_mut!((*ctrl).mutex));
            })
        };
        if let Err(err) = probe {
            self.disconnect();
            return Err(err);
        }

        let theirs = unsafe { std::ptr::read_volatile(addr_of!((*ctrl).peer_encoder_id)) };
        let ours = self.codec.encoder_id();
        if theirs != ours {
            warn!(ours, theirs, "encoder id mismatch, refusing connection");
            self.disconnect();
            return Err(ChannelError::EncoderMismatch { ours, theirs });
        }

        self.connected = true;
        debug!(side = ?self.side, seg = %self.seg_name, "shared-memory channel connected");
        Ok(())
    }

    fn disconnect(&mut self) {
        if let Some(ctrl) = self.ctrl.take() {
            unsafe {
                let _ = munmap(ctrl.cast::<c_void>(), SEG_SIZE);
            }
        }
        self.unmap_payload();
        self.seg_fd = None;
        self.blk_fd = None;

        let was_connected = self.connected;
        self.connected = false;

        if self.side == Side::Server {
            let _ = shm_unlink(self.seg_name.as_str());
            let _ = shm_unlink(self.blk_name.as_str());
        }
        if was_connected {
            debug!(side = ?self.side, seg = %self.seg_name, "shared-memory channel closed");
        }
    }

    fn is_connected(&self) -> bool {
        self.connected
    }

    fn wait_message(&mut self) -> Result<(), ChannelError> {
        if !self.connected {
            return Err(ChannelError::Disconnected);
        }
        let ctrl = self.ctrl_ptr()?;
        unsafe {
            lock_timed(ctrl)?;
            while std::ptr::read_volatile(addr_of!((*ctrl).sender_flag)) == self.side.flag() {
                libc::pthread_cond_wait(addr_of_mut!((*ctrl).cond), addr_of_mut!((*ctrl).mutex));
            }
            libc::pthread_mutex_unlock(addr_of_mut!((*ctrl).mutex));
        }
        Ok(())
    }

    fn wait_message_timeout(&mut self, timeout_ms: u64) -> Result<bool, ChannelError> {
        if !self.connected {
            return Err(ChannelError::Disconnected);
        }
        let ctrl = self.ctrl_ptr()?;
        let deadline = deadline_after(libc::CLOCK_MONOTONIC, timeout_ms);
        let arrived = unsafe {
            lock_timed(ctrl)?;
            let mut arrived =
                std::ptr::read_volatile(addr_of!((*ctrl).sender_flag)) != self.side.flag();
            while !arrived {
                let rc = libc::pthread_cond_timedwait(
                    addr_of_mut!((*ctrl).cond),
                    addr_of_mut!((*ctrl).mutex),
                    &deadline,
                );
                arrived =
                    std::ptr::read_volatile(addr_of!((*ctrl).sender_flag)) != self.side.flag();
                if rc == libc::ETIMEDOUT {
                    break;
                }
            }
            libc::pthread_mutex_unlock(addr_of_mut!((*ctrl).mutex));
            arrived
        };
        Ok(arrived)
    }

    fn peek_tag(&self) -> MessageTag {
        match self.ctrl {
            Some(ctrl) => {
                let raw = unsafe { (*ctrl.as_ptr()).msg_tag.load(Ordering::Acquire) };
                MessageTag::from_u16(raw).unwrap_or(MessageTag::NoMessage)
            }
            None => MessageTag::NoMessage,
        }
    }

    fn send(&mut self, msg: &Message) -> Result<(), ChannelError> {
        if !self.connected {
            return Err(ChannelError::Disconnected);
        }
        let bytes = self.codec.encode(msg)?;
        self.send_frame(msg.tag(), &bytes)
    }

    fn pop_message(&mut self) -> Result<Message, ChannelError> {
        let tag = self.peek_tag();
        let (ptr, len) = self.frame_raw()?;
        let bytes = unsafe { std::slice::from_raw_parts(ptr, len) };
        Ok(self.codec.decode(tag, bytes)?)
    }
}

impl<C: MessageCodec> Drop for ShmemChannel<C> {
    fn drop(&mut self) {
        self.disconnect();
    }
}

/// Acquire the channel mutex with the abandonment bound applied.
unsafe fn lock_timed(ctrl: *mut ControlBlock) -> Result<(), ChannelError> {
    let deadline = deadline_after(libc::CLOCK_REALTIME, LOCK_TIMEOUT_MS);
    let rc = unsafe { libc::pthread_mutex_timedlock(addr_of_mut!((*ctrl).mutex), &deadline) };
    match rc {
        0 => Ok(()),
        libc::ETIMEDOUT => Err(ChannelError::Abandoned),
        err => Err(ChannelError::Os(Errno::from_raw(err))),
    }
}

fn object_size(fd: &OwnedFd) -> Result<u64, ChannelError> {
    let mut st: libc::stat = unsafe { std::mem::zeroed() };
    let rc = unsafe { libc::fstat(fd.as_raw_fd(), &mut st) };
    if rc != 0 {
        return Err(ChannelError::Os(Errno::last()));
    }
    Ok(st.st_size as u64)
}

fn deadline_after(clock: libc::clockid_t, ms: u64) -> libc::timespec {
    let mut ts = libc::timespec {
        tv_sec: 0,
        tv_nsec: 0,
    };
    unsafe {
        libc::clock_gettime(clock, &mut ts);
    }
    let nsec = ts.tv_nsec as i64 + (ms % 1000) as i64 * 1_000_000;
    ts.tv_sec += (ms / 1000) as libc::time_t + (nsec / 1_000_000_000) as libc::time_t;
    ts.tv_nsec = nsec % 1_000_000_000;
    ts
}
