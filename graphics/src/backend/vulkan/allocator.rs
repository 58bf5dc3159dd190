//! GPU memory allocation through gpu-allocator.

use std::sync::Arc;

use ash::vk;
use gpu_allocator::MemoryLocation;
use gpu_allocator::vulkan::{
    Allocation, AllocationCreateDesc, AllocationScheme, Allocator, AllocatorCreateDesc,
};
use parking_lot::Mutex;

use crate::error::GraphicsError;

/// Allocator shared by the backend and every object it allocated memory for.
pub type SharedAllocator = Arc<Mutex<Allocator>>;

/// Create a memory allocator for the Vulkan device.
pub fn create_allocator(
    instance: &ash::Instance,
    physical_device: vk::PhysicalDevice,
    device: ash::Device,
) -> Result<SharedAllocator, GraphicsError> {
    let allocator = Allocator::new(&AllocatorCreateDesc {
        instance: instance.clone(),
        device,
        physical_device,
        debug_settings: Default::default(),
        buffer_device_address: false,
        allocation_sizes: gpu_allocator::AllocationSizes::default(),
    })
    .map_err(|e| {
        GraphicsError::InitializationFailed(format!("Failed to create memory allocator: {e}"))
    })?;

    Ok(Arc::new(Mutex::new(allocator)))
}

/// Allocate device-local memory for a resource.
pub fn allocate(
    allocator: &SharedAllocator,
    name: &str,
    requirements: vk::MemoryRequirements,
    linear: bool,
) -> Result<Allocation, GraphicsError> {
    allocator
        .lock()
        .allocate(&AllocationCreateDesc {
            name,
            requirements,
            location: MemoryLocation::GpuOnly,
            linear,
            allocation_scheme: AllocationScheme::GpuAllocatorManaged,
        })
        .map_err(|e| match e {
            gpu_allocator::AllocationError::OutOfMemory => GraphicsError::OutOfMemory,
            other => GraphicsError::ResourceCreationFailed(format!(
                "Failed to allocate memory for '{name}': {other}"
            )),
        })
}

/// Return an allocation to the allocator, logging failures.
pub fn free(allocator: &SharedAllocator, allocation: Allocation) {
    if let Err(e) = allocator.lock().free(allocation) {
        log::error!("Failed to free GPU allocation: {e}");
    }
}
