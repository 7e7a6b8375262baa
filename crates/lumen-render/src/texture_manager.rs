//! Reference-counted texture arena keyed by hash name

use crate::device::RenderDevice;
use crate::error::RenderError;
use crate::texture::{TextureDesc, TextureHandle};
use lumen_core::ContentHash;
use std::collections::HashMap;
use uuid::Uuid;

struct TextureEntry {
    name: String,
    desc: TextureDesc,
    ref_count: u32,
    guid: Option<Uuid>,
}

/// Owns the bookkeeping of every GPU texture.
///
/// Each texture has a unique name (looked up by its content hash), an
/// optional GUID the asset layer can persist, and a reference count. GPU
/// storage is released through the device when the count reaches zero.
#[derive(Default)]
pub struct TextureManager {
    entries: HashMap<TextureHandle, TextureEntry>,
    by_hash: HashMap<ContentHash, TextureHandle>,
    by_guid: HashMap<Uuid, TextureHandle>,
    next_handle: u32,
}

impl TextureManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate a new cubemap with a reference count of one
    pub fn alloc(
        &mut self,
        name: &str,
        desc: TextureDesc,
        device: &mut dyn RenderDevice,
    ) -> Result<TextureHandle, RenderError> {
        let hash = ContentHash::from_name(name);
        if self.by_hash.contains_key(&hash) {
            return Err(RenderError::TextureNameInUse(name.to_string()));
        }

        let handle = TextureHandle(self.next_handle);
        device.allocate_cubemap(handle, &desc)?;
        self.next_handle += 1;

        self.by_hash.insert(hash, handle);
        self.entries.insert(
            handle,
            TextureEntry {
                name: name.to_string(),
                desc,
                ref_count: 1,
                guid: None,
            },
        );
        log::debug!("allocated texture '{}' ({}px, {} mips)", name, desc.size, desc.mip_levels);
        Ok(handle)
    }

    /// Register `handle` under a fresh GUID and return it
    pub fn assign_guid(&mut self, handle: TextureHandle) -> Result<Uuid, RenderError> {
        let entry = self
            .entries
            .get_mut(&handle)
            .ok_or(RenderError::UnknownTexture(handle))?;
        if let Some(old) = entry.guid.take() {
            self.by_guid.remove(&old);
        }
        let guid = Uuid::new_v4();
        entry.guid = Some(guid);
        self.by_guid.insert(guid, handle);
        Ok(guid)
    }

    /// Re-describe an existing texture in place; the handle stays valid but
    /// its contents are lost
    pub fn recreate(
        &mut self,
        handle: TextureHandle,
        desc: TextureDesc,
        device: &mut dyn RenderDevice,
    ) -> Result<(), RenderError> {
        let entry = self
            .entries
            .get_mut(&handle)
            .ok_or(RenderError::UnknownTexture(handle))?;
        device.allocate_cubemap(handle, &desc)?;
        entry.desc = desc;
        log::debug!("recreated texture '{}' ({}px, {:?})", entry.name, desc.size, desc.format);
        Ok(())
    }

    /// Take an additional reference
    pub fn acquire(&mut self, handle: TextureHandle) -> Result<(), RenderError> {
        let entry = self
            .entries
            .get_mut(&handle)
            .ok_or(RenderError::UnknownTexture(handle))?;
        entry.ref_count += 1;
        Ok(())
    }

    /// Drop a reference, freeing the texture when none remain
    pub fn release(&mut self, handle: TextureHandle, device: &mut dyn RenderDevice) -> Result<(), RenderError> {
        let entry = self
            .entries
            .get_mut(&handle)
            .ok_or(RenderError::UnknownTexture(handle))?;
        entry.ref_count -= 1;
        if entry.ref_count > 0 {
            return Ok(());
        }

        if let Some(entry) = self.entries.remove(&handle) {
            self.by_hash.remove(&ContentHash::from_name(&entry.name));
            if let Some(guid) = entry.guid {
                self.by_guid.remove(&guid);
            }
            log::debug!("released texture '{}'", entry.name);
        }
        device.release_texture(handle);
        Ok(())
    }

    pub fn find(&self, name: &str) -> Option<TextureHandle> {
        self.by_hash.get(&ContentHash::from_name(name)).copied()
    }

    pub fn find_by_guid(&self, guid: Uuid) -> Option<TextureHandle> {
        self.by_guid.get(&guid).copied()
    }

    pub fn desc(&self, handle: TextureHandle) -> Option<&TextureDesc> {
        self.entries.get(&handle).map(|e| &e.desc)
    }

    pub fn name(&self, handle: TextureHandle) -> Option<&str> {
        self.entries.get(&handle).map(|e| e.name.as_str())
    }

    pub fn guid(&self, handle: TextureHandle) -> Option<Uuid> {
        self.entries.get(&handle).and_then(|e| e.guid)
    }

    /// Outstanding references; zero for unknown or freed handles
    pub fn ref_count(&self, handle: TextureHandle) -> u32 {
        self.entries.get(&handle).map(|e| e.ref_count).unwrap_or(0)
    }

    pub fn contains(&self, handle: TextureHandle) -> bool {
        self.entries.contains_key(&handle)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recording::{DeviceCall, RecordingDevice};
    use crate::texture::{PixelFormat, TextureFlags};

    fn desc(size: u32) -> TextureDesc {
        TextureDesc::cubemap(size, 1, PixelFormat::Rgba8Unorm, TextureFlags::CLAMP_NO_MIPMAPS)
    }

    #[test]
    fn test_alloc_and_find() {
        let mut device = RecordingDevice::new();
        let mut textures = TextureManager::new();

        let h = textures.alloc("diffuseProbe-0", desc(16), &mut device).unwrap();
        assert_eq!(textures.find("diffuseProbe-0"), Some(h));
        assert_eq!(textures.ref_count(h), 1);
        assert_eq!(textures.desc(h).unwrap().size, 16);
        assert!(device.is_texture_live(h));
    }

    #[test]
    fn test_duplicate_name_rejected() {
        let mut device = RecordingDevice::new();
        let mut textures = TextureManager::new();

        textures.alloc("sky", desc(16), &mut device).unwrap();
        assert!(matches!(
            textures.alloc("sky", desc(32), &mut device),
            Err(RenderError::TextureNameInUse(_))
        ));
        assert_eq!(textures.len(), 1);
    }

    #[test]
    fn test_refcount_release() {
        let mut device = RecordingDevice::new();
        let mut textures = TextureManager::new();

        let h = textures.alloc("shared", desc(16), &mut device).unwrap();
        textures.acquire(h).unwrap();
        assert_eq!(textures.ref_count(h), 2);

        textures.release(h, &mut device).unwrap();
        assert!(textures.contains(h));
        assert!(device.is_texture_live(h));

        textures.release(h, &mut device).unwrap();
        assert!(!textures.contains(h));
        assert!(textures.find("shared").is_none());
        assert!(!device.is_texture_live(h));
        assert!(matches!(
            textures.release(h, &mut device),
            Err(RenderError::UnknownTexture(_))
        ));
    }

    #[test]
    fn test_guid_registration() {
        let mut device = RecordingDevice::new();
        let mut textures = TextureManager::new();

        let h = textures.alloc("specularProbe-1", desc(64), &mut device).unwrap();
        assert!(textures.guid(h).is_none());

        let guid = textures.assign_guid(h).unwrap();
        assert_eq!(textures.guid(h), Some(guid));
        assert_eq!(textures.find_by_guid(guid), Some(h));

        textures.release(h, &mut device).unwrap();
        assert!(textures.find_by_guid(guid).is_none());
    }

    #[test]
    fn test_recreate_keeps_handle() {
        let mut device = RecordingDevice::new();
        let mut textures = TextureManager::new();

        let h = textures.alloc("probe", desc(16), &mut device).unwrap();
        let bigger = TextureDesc::cubemap(64, 7, PixelFormat::Rg11b10Float, TextureFlags::CLAMP);
        textures.recreate(h, bigger, &mut device).unwrap();

        assert_eq!(textures.desc(h), Some(&bigger));
        assert_eq!(device.texture_desc(h), Some(&bigger));
        let allocations = device
            .calls()
            .iter()
            .filter(|c| matches!(c, DeviceCall::AllocateCubemap { .. }))
            .count();
        assert_eq!(allocations, 2);
    }

    #[test]
    fn test_failed_allocation_leaves_no_entry() {
        let mut device = RecordingDevice::new();
        device.fail_allocations(true);
        let mut textures = TextureManager::new();

        assert!(matches!(
            textures.alloc("probe", desc(16), &mut device),
            Err(RenderError::AllocationFailed { .. })
        ));
        assert!(textures.is_empty());
        assert!(textures.find("probe").is_none());
    }
}
