// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Guest memory marshaling.
//!
//! Exported guest functions only accept integers, so every host string or byte
//! buffer is first copied into a guest heap allocation and every guest-produced
//! pointer is read back through here before its buffer is released.
//!
//! Reads are pure functions over a memory slice, which keeps the record decoder
//! testable against literal byte arrays. Allocation goes through [`CallScope`],
//! an arena that releases everything it allocated (or adopted) when dropped, so
//! early returns and `?` never leak guest buffers.

use super::{Export, Guest, GuestPtr};
use crate::errors::{BridgeError, BridgeResult};
use crate::observability::messages::runtime::BufferReleaseFailed;

/// Buffer length as the 32-bit guest sees it.
pub fn guest_len(len: usize) -> BridgeResult<u32> {
    u32::try_from(len).map_err(|_| {
        BridgeError::InvalidInput(format!(
            "buffer of {} bytes exceeds the guest address space",
            len
        ))
    })
}

/// Ask the guest allocator for `len` bytes.
///
/// Sizes a 32-bit guest cannot address are refused before the guest is called.
pub fn allocate<G: Guest + ?Sized>(guest: &mut G, len: usize) -> BridgeResult<GuestPtr> {
    let size = guest_len(len)?;
    let ptr = GuestPtr::from_raw(guest.call_one(Export::Malloc, &[u64::from(size)])?);
    if ptr.is_null() {
        return Err(BridgeError::MemoryFault(format!(
            "guest allocator returned null for {} bytes",
            len
        )));
    }
    Ok(ptr)
}

/// Return a buffer to the guest allocator. Null pointers are ignored.
pub fn release<G: Guest + ?Sized>(guest: &mut G, ptr: GuestPtr) -> BridgeResult<()> {
    if ptr.is_null() {
        return Ok(());
    }
    guest.call(Export::FreeBuffer, &[ptr.raw()])?;
    Ok(())
}

/// Copy `bytes` into guest memory starting at `ptr`.
pub fn write_bytes<G: Guest + ?Sized>(guest: &mut G, ptr: GuestPtr, bytes: &[u8]) -> BridgeResult<()> {
    let memory = guest.memory_mut();
    let range = span(memory.len(), ptr, 0, bytes.len())?;
    memory[range].copy_from_slice(bytes);
    Ok(())
}

/// Read a NUL-terminated string.
///
/// Returns an empty string for null pointers. A string without a terminator
/// before the end of memory means the guest is corrupted and is a fatal fault.
pub fn read_string(memory: &[u8], ptr: GuestPtr) -> BridgeResult<String> {
    if ptr.is_null() {
        return Ok(String::new());
    }
    let start = ptr.offset() as usize;
    let tail = memory.get(start..).ok_or_else(|| {
        BridgeError::MemoryFault(format!(
            "string pointer 0x{:08x} is outside guest memory ({} bytes)",
            ptr.offset(),
            memory.len()
        ))
    })?;
    let end = tail
        .iter()
        .position(|&b| b == 0)
        .ok_or_else(|| BridgeError::MemoryFault("string is not null terminated".to_string()))?;
    Ok(String::from_utf8_lossy(&tail[..end]).into_owned())
}

pub fn read_u32(memory: &[u8], base: GuestPtr, offset: usize) -> BridgeResult<u32> {
    Ok(u32::from_le_bytes(read_array(memory, base, offset)?))
}

pub fn read_i32(memory: &[u8], base: GuestPtr, offset: usize) -> BridgeResult<i32> {
    Ok(i32::from_le_bytes(read_array(memory, base, offset)?))
}

pub fn read_u64(memory: &[u8], base: GuestPtr, offset: usize) -> BridgeResult<u64> {
    Ok(u64::from_le_bytes(read_array(memory, base, offset)?))
}

pub fn read_f64(memory: &[u8], base: GuestPtr, offset: usize) -> BridgeResult<f64> {
    Ok(f64::from_le_bytes(read_array(memory, base, offset)?))
}

fn read_array<const N: usize>(memory: &[u8], base: GuestPtr, offset: usize) -> BridgeResult<[u8; N]> {
    let range = span(memory.len(), base, offset, N)?;
    let mut out = [0u8; N];
    out.copy_from_slice(&memory[range]);
    Ok(out)
}

fn span(memory_len: usize, base: GuestPtr, offset: usize, len: usize) -> BridgeResult<std::ops::Range<usize>> {
    let start = (base.offset() as usize)
        .checked_add(offset)
        .ok_or_else(|| BridgeError::MemoryFault("guest address overflow".to_string()))?;
    let end = start
        .checked_add(len)
        .ok_or_else(|| BridgeError::MemoryFault("guest address overflow".to_string()))?;
    if end > memory_len {
        return Err(BridgeError::MemoryFault(format!(
            "access to 0x{:08x}..0x{:08x} exceeds guest memory ({} bytes)",
            start, end, memory_len
        )));
    }
    Ok(start..end)
}

/// Guest buffers owned by one host call.
///
/// Every pointer obtained through [`CallScope::alloc`] or registered with
/// [`CallScope::adopt`] is released exactly once, in reverse order, when the
/// scope is dropped.
pub struct CallScope<'g, G: Guest + ?Sized> {
    guest: &'g mut G,
    owned: Vec<GuestPtr>,
}

impl<'g, G: Guest + ?Sized> CallScope<'g, G> {
    pub fn new(guest: &'g mut G) -> Self {
        Self {
            guest,
            owned: Vec::new(),
        }
    }

    pub fn alloc(&mut self, len: usize) -> BridgeResult<GuestPtr> {
        let ptr = allocate(&mut *self.guest, len)?;
        self.owned.push(ptr);
        Ok(ptr)
    }

    /// Allocate and fill a raw byte buffer.
    pub fn alloc_bytes(&mut self, bytes: &[u8]) -> BridgeResult<GuestPtr> {
        let ptr = self.alloc(bytes.len())?;
        write_bytes(&mut *self.guest, ptr, bytes)?;
        Ok(ptr)
    }

    /// Allocate and fill a NUL-terminated string.
    pub fn alloc_str(&mut self, value: &str) -> BridgeResult<GuestPtr> {
        let ptr = self.alloc(value.len() + 1)?;
        write_bytes(&mut *self.guest, ptr, value.as_bytes())?;
        write_bytes(&mut *self.guest, ptr.add(value.len() as u32), &[0])?;
        Ok(ptr)
    }

    /// Take ownership of a buffer the guest allocated for this call.
    pub fn adopt(&mut self, ptr: GuestPtr) {
        if !ptr.is_null() {
            self.owned.push(ptr);
        }
    }

    pub fn call(&mut self, export: Export, params: &[u64]) -> BridgeResult<Vec<u64>> {
        self.guest.call(export, params)
    }

    pub fn call_one(&mut self, export: Export, params: &[u64]) -> BridgeResult<u64> {
        self.guest.call_one(export, params)
    }

    pub fn memory(&self) -> &[u8] {
        self.guest.memory()
    }

    pub fn read_string(&self, ptr: GuestPtr) -> BridgeResult<String> {
        read_string(self.guest.memory(), ptr)
    }

    pub fn outstanding(&self) -> usize {
        self.owned.len()
    }
}

impl<G: Guest + ?Sized> Drop for CallScope<'_, G> {
    fn drop(&mut self) {
        while let Some(ptr) = self.owned.pop() {
            if let Err(error) = release(&mut *self.guest, ptr) {
                tracing::error!(
                    "{}",
                    BufferReleaseFailed {
                        ptr: ptr.offset(),
                        error: &error,
                    }
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::guest::fake::FakeGuest;
    use crate::guest::NULL_SENTINEL;

    #[test]
    fn test_read_string_null_pointers() {
        let memory = vec![b'x'; 64];
        assert_eq!(read_string(&memory, GuestPtr::NULL).unwrap(), "");
        assert_eq!(
            read_string(&memory, GuestPtr::from_raw(u64::from(NULL_SENTINEL))).unwrap(),
            ""
        );
    }

    #[test]
    fn test_read_string_stops_at_first_nul() {
        let mut memory = vec![0u8; 32];
        memory[8..13].copy_from_slice(b"hello");
        memory[14..19].copy_from_slice(b"world");
        assert_eq!(read_string(&memory, GuestPtr::from_raw(8)).unwrap(), "hello");
        assert_eq!(read_string(&memory, GuestPtr::from_raw(13)).unwrap(), "");
    }

    #[test]
    fn test_read_string_without_terminator_is_fatal() {
        let memory = b"no terminator here".to_vec();
        let result = read_string(&memory, GuestPtr::from_raw(3));
        match result {
            Err(error @ BridgeError::MemoryFault(_)) => assert!(error.is_fatal()),
            other => panic!("Expected MemoryFault, got {:?}", other),
        }
    }

    #[test]
    fn test_read_string_out_of_bounds() {
        let memory = vec![0u8; 16];
        assert!(read_string(&memory, GuestPtr::from_raw(17)).is_err());
    }

    #[test]
    fn test_typed_reads_are_little_endian() {
        let mut memory = vec![0u8; 32];
        memory[4..8].copy_from_slice(&(-7i32).to_le_bytes());
        memory[8..16].copy_from_slice(&0x0102_0304_0506_0708u64.to_le_bytes());
        memory[16..24].copy_from_slice(&91.5f64.to_le_bytes());

        let base = GuestPtr::from_raw(4);
        assert_eq!(read_i32(&memory, base, 0).unwrap(), -7);
        assert_eq!(read_u64(&memory, base, 4).unwrap(), 0x0102_0304_0506_0708);
        assert_eq!(read_f64(&memory, base, 12).unwrap(), 91.5);
        assert!(read_u32(&memory, base, 28).is_err());
    }

    #[test]
    fn test_scope_releases_everything_on_drop() {
        let mut guest = FakeGuest::new();
        {
            let mut scope = CallScope::new(&mut guest);
            let path = scope.alloc_str("/tmp/image.png").unwrap();
            scope.alloc_bytes(&[1, 2, 3]).unwrap();
            assert_eq!(scope.read_string(path).unwrap(), "/tmp/image.png");
            assert_eq!(scope.outstanding(), 2);
        }
        assert_eq!(guest.live_allocations(), 0);
        assert_eq!(guest.total_allocations(), 2);
    }

    #[test]
    fn test_scope_releases_on_early_return() {
        fn failing(guest: &mut FakeGuest) -> BridgeResult<()> {
            let mut scope = CallScope::new(guest);
            scope.alloc_str("languages")?;
            Err(BridgeError::InvalidInput("bail out".to_string()))
        }

        let mut guest = FakeGuest::new();
        assert!(failing(&mut guest).is_err());
        assert_eq!(guest.live_allocations(), 0);
    }

    #[test]
    fn test_adopted_buffers_are_released_once() {
        let mut guest = FakeGuest::new();
        let ptr = allocate(&mut guest, 16).unwrap();
        {
            let mut scope = CallScope::new(&mut guest);
            scope.adopt(ptr);
            scope.adopt(GuestPtr::NULL);
        }
        assert_eq!(guest.live_allocations(), 0);
        assert_eq!(guest.calls_to(Export::FreeBuffer), 1);
    }

    #[test]
    #[cfg(target_pointer_width = "64")]
    fn test_oversized_allocation_is_caller_error() {
        let mut guest = FakeGuest::new();
        let result = allocate(&mut guest, u32::MAX as usize + 1);

        match result {
            Err(error @ BridgeError::InvalidInput(_)) => assert!(!error.is_fatal()),
            other => panic!("Expected InvalidInput, got {:?}", other),
        }
        assert_eq!(guest.calls_to(Export::Malloc), 0);
    }

    #[test]
    fn test_write_out_of_bounds_is_fatal() {
        let mut guest = FakeGuest::new();
        let end = GuestPtr::from_raw(guest.memory().len() as u64 - 2);
        let result = write_bytes(&mut guest, end, b"abcd");
        assert!(matches!(result, Err(BridgeError::MemoryFault(_))));
    }
}
