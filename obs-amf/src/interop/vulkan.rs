//! Vulkan bridge for GL renderers
//!
//! The renderer's luma and chroma planes are blitted in GL into two images
//! whose memory is exported from Vulkan. A command buffer then copies both
//! planes into the multi-planar image handed to the encoder. Two exported
//! semaphores order the GL and Vulkan sides:
//!
//! - `sem`: GL signals after the blit, the Vulkan copy waits on it
//! - `copy_sem`: the Vulkan copy signals, GL waits before the next blit and
//!   the encoder waits before reading the image

use super::gl::*;
use super::{GlPlane, GraphicsGuard, GraphicsScope, HandleCache, PlaneFormat, TextureBridge, TextureInput};
use crate::codec::SurfaceFormat;
use crate::error::{Error, Result};
use crate::runtime::sys::{AMFVulkanDevice, AMFVulkanSurface, AMFVulkanSync, AMF_MEMORY_CPU_LOCAL, AMF_SURFACE_USAGE_DEFAULT};
use crate::runtime::{Context, ReleaseObserver, Surface};
use ash::vk::{self, Handle};
use ash::{ext, khr, Device, Entry, Instance};
use std::ffi::{c_void, CString};
use std::mem::size_of;
use std::ptr;
use std::sync::Arc;

fn vk_error(err: vk::Result) -> Error {
    Error::platform("Vulkan error", err.as_raw())
}

const COLOR_RANGE: vk::ImageSubresourceRange = vk::ImageSubresourceRange {
    aspect_mask: vk::ImageAspectFlags::COLOR,
    base_mip_level: 0,
    level_count: 1,
    base_array_layer: 0,
    layer_count: 1,
};

fn surface_vk_format(format: SurfaceFormat) -> Result<vk::Format> {
    match format {
        SurfaceFormat::Nv12 => Ok(vk::Format::G8_B8R8_2PLANE_420_UNORM),
        SurfaceFormat::P010 => Ok(vk::Format::G16_B16R16_2PLANE_420_UNORM),
        _ => Err(Error::Unsupported("Unsupported surface format")),
    }
}

fn plane_vk_format(format: PlaneFormat) -> vk::Format {
    match format {
        PlaneFormat::R8 => vk::Format::R8_UNORM,
        PlaneFormat::R16 => vk::Format::R16_UNORM,
        PlaneFormat::Rg8 => vk::Format::R8G8_UNORM,
        PlaneFormat::Rg16 => vk::Format::R16G16_UNORM,
    }
}

// ---------------------------------------------------------------------------
// Submission

/// Semaphores and recorded commands of one queue submission
#[derive(Clone, Copy)]
struct Batch<'a> {
    wait: &'a [vk::Semaphore],
    signal: &'a [vk::Semaphore],
    /// Whether the recorded command buffer is part of the batch
    commands: bool,
}

/// Command buffer and queue operations behind the plane copy
trait CommandQueue {
    fn reset_commands(&self) -> Result<()>;
    fn begin_commands(&self) -> Result<()>;
    fn end_commands(&self) -> Result<()>;
    fn reset_fence(&self, fence: vk::Fence) -> Result<()>;
    fn queue_batch(&self, batch: Batch<'_>, fence: vk::Fence) -> Result<()>;
}

/// Start recording, discarding anything a failed recording left open
fn begin_recording(queue: &impl CommandQueue) -> Result<()> {
    queue.reset_commands()?;
    queue.begin_commands()
}

/// Outcome of a fence-guarded submission
struct Submitted {
    result: Result<()>,
    /// The fence will signal, so the next wait on it returns
    armed: bool,
}

/// Reset `fence` and submit `batch` with it
///
/// When the batch with commands is refused, the same semaphores are
/// submitted without them so the fence and the GL-facing semaphores still
/// signal.
fn submit_fenced(queue: &impl CommandQueue, batch: Batch<'_>, fence: vk::Fence) -> Submitted {
    if let Err(err) = queue.reset_fence(fence) {
        return Submitted {
            result: Err(err),
            armed: false,
        };
    }
    match queue.queue_batch(batch, fence) {
        Ok(()) => Submitted {
            result: Ok(()),
            armed: true,
        },
        Err(err) if batch.commands => {
            let empty = Batch {
                commands: false,
                ..batch
            };
            let armed = match queue.queue_batch(empty, fence) {
                Ok(()) => true,
                Err(rearm) => {
                    log::warn!("failed to signal the copy fence: {}", rearm);
                    false
                }
            };
            Submitted { result: Err(err), armed }
        }
        Err(err) => Submitted {
            result: Err(err),
            armed: false,
        },
    }
}

// ---------------------------------------------------------------------------
// Device

/// Vulkan device on the AMD proprietary driver, shared with the encoder
pub struct VulkanDevice {
    _entry: Entry,
    instance: Instance,
    physical: vk::PhysicalDevice,
    device: Device,
    /// Handed to the runtime by address
    _amf_device: Box<AMFVulkanDevice>,
    queue: vk::Queue,
    command_pool: vk::CommandPool,
    command_buffer: vk::CommandBuffer,
    memory_fd: khr::external_memory_fd::Device,
    semaphore_fd: khr::external_semaphore_fd::Device,
}

impl VulkanDevice {
    /// Create the device and bind `amf` to it
    pub fn create(amf: &Context) -> Result<Self> {
        let entry = unsafe { Entry::load() }.map_err(|err| {
            log::error!("failed to load the Vulkan loader: {err}");
            Error::Failed("Failed to load Vulkan")
        })?;

        let app_info = vk::ApplicationInfo::default()
            .application_name(c"OBS")
            .api_version(vk::API_VERSION_1_2);
        let instance_extensions = [
            khr::get_physical_device_properties2::NAME.as_ptr(),
            khr::surface::NAME.as_ptr(),
        ];
        let instance_info = vk::InstanceCreateInfo::default()
            .application_info(&app_info)
            .enabled_extension_names(&instance_extensions);
        let instance = unsafe { entry.create_instance(&instance_info, None) }.map_err(vk_error)?;

        match Self::with_instance(entry, instance, amf) {
            Ok(device) => Ok(device),
            Err((instance, err)) => {
                unsafe { instance.destroy_instance(None) };
                Err(err)
            }
        }
    }

    fn with_instance(
        entry: Entry,
        instance: Instance,
        amf: &Context,
    ) -> std::result::Result<Self, (Instance, Error)> {
        let physical = match find_amd_device(&instance) {
            Ok(physical) => physical,
            Err(err) => return Err((instance, err)),
        };
        let device = match create_logical_device(&instance, physical, amf) {
            Ok(device) => device,
            Err(err) => return Err((instance, err)),
        };

        let mut amf_device = Box::new(AMFVulkanDevice {
            cbSizeof: size_of::<AMFVulkanDevice>(),
            pNext: ptr::null_mut(),
            hInstance: instance.handle().as_raw() as *mut c_void,
            hPhysicalDevice: physical.as_raw() as *mut c_void,
            hDevice: device.handle().as_raw() as *mut c_void,
        });

        let setup = (|| -> Result<(vk::Queue, vk::CommandPool, vk::CommandBuffer)> {
            amf.init_vulkan(&mut *amf_device as *mut AMFVulkanDevice as *mut c_void)?;
            let queue = unsafe { device.get_device_queue(0, 0) };

            let pool_info = vk::CommandPoolCreateInfo::default()
                .queue_family_index(0)
                .flags(vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER);
            let command_pool = unsafe { device.create_command_pool(&pool_info, None) }.map_err(vk_error)?;

            let alloc_info = vk::CommandBufferAllocateInfo::default()
                .command_pool(command_pool)
                .level(vk::CommandBufferLevel::PRIMARY)
                .command_buffer_count(1);
            let command_buffer = match unsafe { device.allocate_command_buffers(&alloc_info) } {
                Ok(buffers) if !buffers.is_empty() => buffers[0],
                Ok(_) => {
                    unsafe { device.destroy_command_pool(command_pool, None) };
                    return Err(Error::Failed("vkAllocateCommandBuffers failed"));
                }
                Err(err) => {
                    unsafe { device.destroy_command_pool(command_pool, None) };
                    return Err(vk_error(err));
                }
            };

            for (name, reason) in [
                (c"vkGetMemoryFdKHR", "Failed to resolve vkGetMemoryFdKHR"),
                (c"vkGetSemaphoreFdKHR", "Failed to resolve vkGetSemaphoreFdKHR"),
            ] {
                let proc = unsafe { (instance.fp_v1_0().get_device_proc_addr)(device.handle(), name.as_ptr()) };
                if proc.is_none() {
                    unsafe { device.destroy_command_pool(command_pool, None) };
                    return Err(Error::Failed(reason));
                }
            }
            Ok((queue, command_pool, command_buffer))
        })();

        match setup {
            Ok((queue, command_pool, command_buffer)) => Ok(VulkanDevice {
                memory_fd: khr::external_memory_fd::Device::new(&instance, &device),
                semaphore_fd: khr::external_semaphore_fd::Device::new(&instance, &device),
                _entry: entry,
                instance,
                physical,
                device,
                _amf_device: amf_device,
                queue,
                command_pool,
                command_buffer,
            }),
            Err(err) => {
                unsafe { device.destroy_device(None) };
                Err((instance, err))
            }
        }
    }

    pub fn device(&self) -> &Device {
        &self.device
    }

    fn memory_type_index(&self, properties: vk::MemoryPropertyFlags, type_bits: u32) -> u32 {
        let props = unsafe { self.instance.get_physical_device_memory_properties(self.physical) };
        props.memory_types[..props.memory_type_count as usize]
            .iter()
            .enumerate()
            .find(|(i, ty)| ty.property_flags.contains(properties) && type_bits & (1 << i) != 0)
            .map(|(i, _)| i as u32)
            .unwrap_or(u32::MAX)
    }

    fn begin(&self) -> Result<()> {
        begin_recording(self)
    }

    /// End and submit the command buffer, blocking until the work completes
    fn submit(&self, signal: Option<vk::Semaphore>) -> Result<()> {
        self.end_commands()?;
        let signal: Vec<vk::Semaphore> = signal.into_iter().collect();
        let batch = Batch {
            wait: &[],
            signal: &signal,
            commands: true,
        };
        unsafe {
            let fence = self
                .device
                .create_fence(&vk::FenceCreateInfo::default(), None)
                .map_err(vk_error)?;
            let res = self.queue_batch(batch, fence).and_then(|_| {
                self.device
                    .wait_for_fences(&[fence], true, u64::MAX)
                    .map_err(vk_error)
            });
            self.device.destroy_fence(fence, None);
            res
        }
    }

    fn wait_idle(&self) {
        if let Err(err) = unsafe { self.device.device_wait_idle() } {
            log::warn!("vkDeviceWaitIdle failed: {err}");
        }
    }
}

impl CommandQueue for VulkanDevice {
    fn reset_commands(&self) -> Result<()> {
        unsafe {
            self.device
                .reset_command_buffer(self.command_buffer, vk::CommandBufferResetFlags::empty())
        }
        .map_err(vk_error)
    }

    fn begin_commands(&self) -> Result<()> {
        let info = vk::CommandBufferBeginInfo::default();
        unsafe { self.device.begin_command_buffer(self.command_buffer, &info) }.map_err(vk_error)
    }

    fn end_commands(&self) -> Result<()> {
        unsafe { self.device.end_command_buffer(self.command_buffer) }.map_err(vk_error)
    }

    fn reset_fence(&self, fence: vk::Fence) -> Result<()> {
        unsafe { self.device.reset_fences(&[fence]) }.map_err(vk_error)
    }

    fn queue_batch(&self, batch: Batch<'_>, fence: vk::Fence) -> Result<()> {
        let command_buffers: &[vk::CommandBuffer] = if batch.commands {
            std::slice::from_ref(&self.command_buffer)
        } else {
            &[]
        };
        let wait_stages = vec![vk::PipelineStageFlags::TOP_OF_PIPE; batch.wait.len()];
        let submit = vk::SubmitInfo::default()
            .command_buffers(command_buffers)
            .wait_semaphores(batch.wait)
            .wait_dst_stage_mask(&wait_stages)
            .signal_semaphores(batch.signal);
        unsafe { self.device.queue_submit(self.queue, &[submit], fence) }.map_err(vk_error)
    }
}

impl Drop for VulkanDevice {
    fn drop(&mut self) {
        unsafe {
            self.device
                .free_command_buffers(self.command_pool, &[self.command_buffer]);
            self.device.destroy_command_pool(self.command_pool, None);
            self.device.destroy_device(None);
            self.instance.destroy_instance(None);
        }
    }
}

/// Require the AMD proprietary driver on the first Vulkan device
pub fn check_amd_driver() -> Result<()> {
    let entry = unsafe { Entry::load() }.map_err(|_| Error::Failed("Failed to initialize Vulkan"))?;
    let app_info = vk::ApplicationInfo::default()
        .application_name(c"obs-amf-test")
        .api_version(vk::API_VERSION_1_2);
    let info = vk::InstanceCreateInfo::default().application_info(&app_info);
    let instance = unsafe { entry.create_instance(&info, None) }
        .map_err(|_| Error::Failed("Failed to initialize Vulkan"))?;

    let result = (|| {
        let devices = unsafe { instance.enumerate_physical_devices() }
            .map_err(|_| Error::Failed("Failed to enumerate Vulkan devices"))?;
        let first = *devices
            .first()
            .ok_or(Error::Failed("Failed to enumerate Vulkan devices"))?;

        let mut driver = vk::PhysicalDeviceDriverProperties::default();
        let mut props = vk::PhysicalDeviceProperties2::default().push_next(&mut driver);
        unsafe { instance.get_physical_device_properties2(first, &mut props) };
        if driver.driver_id != vk::DriverId::AMD_PROPRIETARY {
            return Err(Error::Failed("Not running AMD proprietary driver"));
        }
        Ok(())
    })();

    unsafe { instance.destroy_instance(None) };
    result
}

fn find_amd_device(instance: &Instance) -> Result<vk::PhysicalDevice> {
    let devices = unsafe { instance.enumerate_physical_devices() }.map_err(vk_error)?;
    devices
        .into_iter()
        .find(|&dev| {
            let mut driver = vk::PhysicalDeviceDriverProperties::default();
            let mut props = vk::PhysicalDeviceProperties2::default().push_next(&mut driver);
            unsafe { instance.get_physical_device_properties2(dev, &mut props) };
            driver.driver_id == vk::DriverId::AMD_PROPRIETARY
        })
        .ok_or(Error::Failed(
            "Failed to find Vulkan device VK_DRIVER_ID_AMD_PROPRIETARY",
        ))
}

fn create_logical_device(instance: &Instance, physical: vk::PhysicalDevice, amf: &Context) -> Result<Device> {
    let mut wanted: Vec<CString> = [
        khr::external_memory_fd::NAME,
        khr::external_semaphore_fd::NAME,
        ext::external_memory_host::NAME,
        khr::sampler_ycbcr_conversion::NAME,
    ]
    .iter()
    .map(|name| (*name).to_owned())
    .collect();
    wanted.extend(amf.vulkan_device_extensions()?);

    let available = unsafe { instance.enumerate_device_extension_properties(physical) }.map_err(vk_error)?;
    let enabled: Vec<*const std::os::raw::c_char> = wanted
        .iter()
        .filter(|name| {
            available
                .iter()
                .any(|ext| ext.extension_name_as_c_str().is_ok_and(|n| n == name.as_c_str()))
        })
        .map(|name| name.as_ptr())
        .collect();

    let priorities = [1.0f32];
    let families = unsafe { instance.get_physical_device_queue_family_properties(physical) };
    let queue_infos: Vec<vk::DeviceQueueCreateInfo> = (0..families.len() as u32)
        .map(|family| {
            vk::DeviceQueueCreateInfo::default()
                .queue_family_index(family)
                .queue_priorities(&priorities)
        })
        .collect();

    let device_info = vk::DeviceCreateInfo::default()
        .queue_create_infos(&queue_infos)
        .enabled_extension_names(&enabled);
    unsafe { instance.create_device(physical, &device_info, None) }.map_err(vk_error)
}

// ---------------------------------------------------------------------------
// Encoder images

/// Multi-planar image the encoder reads, described to the runtime by address
pub struct EncoderImage {
    surface: Box<AMFVulkanSurface>,
}

// The description is only written on the encode thread; the runtime reads
// it while the surface is in flight.
unsafe impl Send for EncoderImage {}

impl EncoderImage {
    fn create(vk: &VulkanDevice, format: SurfaceFormat, width: u32, height: u32) -> Result<Self> {
        let vk_format = surface_vk_format(format)?;
        let device = &vk.device;

        let image_info = vk::ImageCreateInfo::default()
            .image_type(vk::ImageType::TYPE_2D)
            .format(vk_format)
            .extent(vk::Extent3D { width, height, depth: 1 })
            .mip_levels(1)
            .array_layers(1)
            .samples(vk::SampleCountFlags::TYPE_1)
            .tiling(vk::ImageTiling::LINEAR)
            .usage(vk::ImageUsageFlags::SAMPLED | vk::ImageUsageFlags::TRANSFER_DST)
            .flags(vk::ImageCreateFlags::MUTABLE_FORMAT)
            .sharing_mode(vk::SharingMode::EXCLUSIVE)
            .initial_layout(vk::ImageLayout::UNDEFINED);

        unsafe {
            let image = device.create_image(&image_info, None).map_err(vk_error)?;
            let reqs = device.get_image_memory_requirements(image);
            let alloc = vk::MemoryAllocateInfo::default()
                .allocation_size(reqs.size)
                .memory_type_index(vk.memory_type_index(vk::MemoryPropertyFlags::DEVICE_LOCAL, reqs.memory_type_bits));
            let memory = match device.allocate_memory(&alloc, None) {
                Ok(memory) => memory,
                Err(err) => {
                    device.destroy_image(image, None);
                    return Err(vk_error(err));
                }
            };

            let image = EncoderImage {
                surface: Box::new(AMFVulkanSurface {
                    cbSizeof: size_of::<AMFVulkanSurface>(),
                    pNext: ptr::null_mut(),
                    hImage: image.as_raw(),
                    eUsage: AMF_SURFACE_USAGE_DEFAULT,
                    eAccess: AMF_MEMORY_CPU_LOCAL,
                    hMemory: memory.as_raw(),
                    iSize: reqs.size as i64,
                    eFormat: vk_format.as_raw() as u32,
                    iWidth: width as i32,
                    iHeight: height as i32,
                    eCurrentLayout: vk::ImageLayout::UNDEFINED.as_raw() as u32,
                    Sync: AMFVulkanSync {
                        cbSizeof: size_of::<AMFVulkanSync>(),
                        pNext: ptr::null_mut(),
                        hSemaphore: 0,
                        bSubmitted: true,
                        hFence: 0,
                    },
                }),
            };

            if let Err(err) = image.initialize(vk) {
                image.free(device);
                return Err(err);
            }
            Ok(image)
        }
    }

    fn image(&self) -> vk::Image {
        vk::Image::from_raw(self.surface.hImage)
    }

    fn memory(&self) -> vk::DeviceMemory {
        vk::DeviceMemory::from_raw(self.surface.hMemory)
    }

    /// Bind memory and move the image to `GENERAL`
    unsafe fn initialize(&self, vk: &VulkanDevice) -> Result<()> {
        vk.device
            .bind_image_memory(self.image(), self.memory(), 0)
            .map_err(vk_error)?;

        vk.begin()?;
        let barrier = vk::ImageMemoryBarrier::default()
            .old_layout(vk::ImageLayout::UNDEFINED)
            .new_layout(vk::ImageLayout::GENERAL)
            .image(self.image())
            .subresource_range(COLOR_RANGE)
            .dst_access_mask(vk::AccessFlags::MEMORY_READ | vk::AccessFlags::MEMORY_WRITE);
        vk.device.cmd_pipeline_barrier(
            vk.command_buffer,
            vk::PipelineStageFlags::TOP_OF_PIPE,
            vk::PipelineStageFlags::TRANSFER,
            vk::DependencyFlags::empty(),
            &[],
            &[],
            &[barrier],
        );
        vk.submit(None)
    }

    unsafe fn free(&self, device: &Device) {
        device.free_memory(self.memory(), None);
        device.destroy_image(self.image(), None);
    }
}

// ---------------------------------------------------------------------------
// GL-visible planes

/// One exported plane image and its GL import
#[derive(Default)]
struct ImportedPlane {
    image: vk::Image,
    memory: vk::DeviceMemory,
    gl_memory: u32,
    gl_texture: u32,
    fbo: u32,
    width: u32,
    height: u32,
}

/// The plane pair and semaphores shared between GL and Vulkan
#[derive(Default)]
struct PlaneInterop {
    planes: [ImportedPlane; 2],
    sem: vk::Semaphore,
    copy_sem: vk::Semaphore,
    copy_fence: vk::Fence,
    gl_sem: u32,
    gl_copy_sem: u32,
    ready: bool,
}

pub struct VulkanBridge {
    amf: Context,
    observer: Box<ReleaseObserver>,
    scope: Arc<dyn GraphicsScope>,
    format: SurfaceFormat,
    gl: GlFunctions,
    interop: PlaneInterop,
    /// Framebuffers over renderer textures, keyed by GL texture name
    read_fbos: HandleCache<u32, u32>,
    vk: VulkanDevice,
}

impl VulkanBridge {
    /// Create the device, bind `amf` to it and resolve the GL entry points
    pub fn new(
        amf: Context,
        observer: Box<ReleaseObserver>,
        scope: Arc<dyn GraphicsScope>,
        format: SurfaceFormat,
    ) -> Result<Self> {
        surface_vk_format(format)?;
        let vk = VulkanDevice::create(&amf)?;
        let gl = {
            let _graphics = GraphicsGuard::new(scope.as_ref());
            GlFunctions::load()?
        };
        Ok(VulkanBridge {
            amf,
            observer,
            scope,
            format,
            gl,
            interop: PlaneInterop::default(),
            read_fbos: HandleCache::new(),
            vk,
        })
    }

    pub fn context(&self) -> &Context {
        &self.amf
    }

    fn planes<'a>(input: &'a TextureInput<'_>) -> Result<&'a [GlPlane; 2]> {
        match input {
            TextureInput::Planes(planes) => Ok(planes),
            TextureInput::Shared { .. } => Err(Error::BadFrame("Encode failed: expected GL planes")),
        }
    }

    /// Create the exported plane images, their GL imports and the semaphores
    fn create_interop(&mut self, planes: &[GlPlane; 2]) -> Result<()> {
        let device = &self.vk.device;
        self.vk.begin()?;

        for (plane, src) in self.interop.planes.iter_mut().zip(planes) {
            plane.width = src.width;
            plane.height = src.height;

            let mut external = vk::ExternalMemoryImageCreateInfo::default()
                .handle_types(vk::ExternalMemoryHandleTypeFlags::OPAQUE_FD);
            let image_info = vk::ImageCreateInfo::default()
                .push_next(&mut external)
                .image_type(vk::ImageType::TYPE_2D)
                .format(plane_vk_format(src.format))
                .extent(vk::Extent3D {
                    width: src.width,
                    height: src.height,
                    depth: 1,
                })
                .mip_levels(1)
                .array_layers(1)
                .samples(vk::SampleCountFlags::TYPE_1)
                .tiling(vk::ImageTiling::OPTIMAL)
                .usage(vk::ImageUsageFlags::SAMPLED | vk::ImageUsageFlags::TRANSFER_SRC)
                .sharing_mode(vk::SharingMode::EXCLUSIVE)
                .initial_layout(vk::ImageLayout::UNDEFINED);

            let size = unsafe {
                plane.image = device.create_image(&image_info, None).map_err(vk_error)?;
                let reqs = device.get_image_memory_requirements(plane.image);

                let mut export = vk::ExportMemoryAllocateInfo::default()
                    .handle_types(vk::ExternalMemoryHandleTypeFlags::OPAQUE_FD);
                let mut dedicated = vk::MemoryDedicatedAllocateInfo::default().image(plane.image);
                let alloc = vk::MemoryAllocateInfo::default()
                    .push_next(&mut dedicated)
                    .push_next(&mut export)
                    .allocation_size(reqs.size)
                    .memory_type_index(
                        self.vk
                            .memory_type_index(vk::MemoryPropertyFlags::DEVICE_LOCAL, reqs.memory_type_bits),
                    );
                plane.memory = device.allocate_memory(&alloc, None).map_err(vk_error)?;
                device
                    .bind_image_memory(plane.image, plane.memory, 0)
                    .map_err(vk_error)?;

                let to_transfer = vk::ImageMemoryBarrier::default()
                    .old_layout(vk::ImageLayout::UNDEFINED)
                    .new_layout(vk::ImageLayout::TRANSFER_SRC_OPTIMAL)
                    .image(plane.image)
                    .subresource_range(COLOR_RANGE);
                let to_external = to_transfer
                    .old_layout(vk::ImageLayout::TRANSFER_SRC_OPTIMAL)
                    .src_queue_family_index(0)
                    .dst_queue_family_index(vk::QUEUE_FAMILY_EXTERNAL);
                for barrier in [to_transfer, to_external] {
                    device.cmd_pipeline_barrier(
                        self.vk.command_buffer,
                        vk::PipelineStageFlags::TOP_OF_PIPE,
                        vk::PipelineStageFlags::TRANSFER,
                        vk::DependencyFlags::empty(),
                        &[],
                        &[],
                        &[barrier],
                    );
                }
                reqs.size
            };

            let fd_info = vk::MemoryGetFdInfoKHR::default()
                .memory(plane.memory)
                .handle_type(vk::ExternalMemoryHandleTypeFlags::OPAQUE_FD);
            let fd = unsafe { self.vk.memory_fd.get_memory_fd(&fd_info) }.map_err(vk_error)?;

            let gl = &self.gl;
            let _graphics = GraphicsGuard::new(self.scope.as_ref());
            let imported = unsafe {
                (gl.glCreateMemoryObjectsEXT)(1, &mut plane.gl_memory);
                (gl.glMemoryObjectParameterivEXT)(plane.gl_memory, GL_DEDICATED_MEMORY_OBJECT_EXT, &GL_TRUE);
                (gl.glImportMemoryFdEXT)(plane.gl_memory, size, GL_HANDLE_TYPE_OPAQUE_FD_EXT, fd);

                (gl.glGenTextures)(1, &mut plane.gl_texture);
                (gl.glBindTexture)(GL_TEXTURE_2D, plane.gl_texture);
                (gl.glTexParameteri)(GL_TEXTURE_2D, GL_TEXTURE_TILING_EXT, GL_OPTIMAL_TILING_EXT);
                (gl.glTexStorageMem2DEXT)(
                    GL_TEXTURE_2D,
                    1,
                    src.format.gl_internal_format(),
                    src.width as i32,
                    src.height as i32,
                    plane.gl_memory,
                    0,
                );
                plane.fbo = gl.framebuffer_for(plane.gl_texture);

                (gl.glIsMemoryObjectEXT)(plane.gl_memory) != 0 && gl.no_error()
            };
            if !imported {
                return Err(Error::Failed("OpenGL texture import failed"));
            }
        }

        let interop = &mut self.interop;
        unsafe {
            let mut export = vk::ExportSemaphoreCreateInfo::default()
                .handle_types(vk::ExternalSemaphoreHandleTypeFlags::OPAQUE_FD);
            let sem_info = vk::SemaphoreCreateInfo::default().push_next(&mut export);
            interop.sem = device.create_semaphore(&sem_info, None).map_err(vk_error)?;
            interop.copy_sem = device.create_semaphore(&sem_info, None).map_err(vk_error)?;
            let signalled = vk::FenceCreateInfo::default().flags(vk::FenceCreateFlags::SIGNALED);
            interop.copy_fence = device.create_fence(&signalled, None).map_err(vk_error)?;
        }

        self.vk.submit(Some(interop.copy_sem))?;

        let semaphore_fd = |semaphore| {
            let info = vk::SemaphoreGetFdInfoKHR::default()
                .semaphore(semaphore)
                .handle_type(vk::ExternalSemaphoreHandleTypeFlags::OPAQUE_FD);
            unsafe { self.vk.semaphore_fd.get_semaphore_fd(&info) }.map_err(vk_error)
        };
        let fd = semaphore_fd(interop.sem)?;
        let fd_copy = match semaphore_fd(interop.copy_sem) {
            Ok(fd_copy) => fd_copy,
            Err(err) => {
                // GL never took ownership of the first descriptor
                unsafe { libc::close(fd) };
                return Err(err);
            }
        };

        let gl = &self.gl;
        let _graphics = GraphicsGuard::new(self.scope.as_ref());
        let imported = unsafe {
            (gl.glGenSemaphoresEXT)(1, &mut interop.gl_sem);
            (gl.glGenSemaphoresEXT)(1, &mut interop.gl_copy_sem);
            (gl.glImportSemaphoreFdEXT)(interop.gl_sem, GL_HANDLE_TYPE_OPAQUE_FD_EXT, fd);
            (gl.glImportSemaphoreFdEXT)(interop.gl_copy_sem, GL_HANDLE_TYPE_OPAQUE_FD_EXT, fd_copy);

            (gl.glIsSemaphoreEXT)(interop.gl_sem) != 0
                && (gl.glIsSemaphoreEXT)(interop.gl_copy_sem) != 0
                && gl.no_error()
        };
        if !imported {
            return Err(Error::Failed("OpenGL semaphore import failed"));
        }

        interop.ready = true;
        Ok(())
    }

    /// Free the plane pair, semaphores and read framebuffers
    fn release_interop(&mut self) {
        let interop = std::mem::take(&mut self.interop);
        let fbos: Vec<u32> = self.read_fbos.drain().map(|(_, fbo)| fbo).collect();
        let device = &self.vk.device;
        let gl = &self.gl;

        let _graphics = GraphicsGuard::new(self.scope.as_ref());
        unsafe {
            for plane in &interop.planes {
                device.free_memory(plane.memory, None);
                device.destroy_image(plane.image, None);
                (gl.glDeleteMemoryObjectsEXT)(1, &plane.gl_memory);
                (gl.glDeleteTextures)(1, &plane.gl_texture);
                (gl.glDeleteFramebuffers)(1, &plane.fbo);
            }
            device.destroy_semaphore(interop.sem, None);
            device.destroy_semaphore(interop.copy_sem, None);
            device.destroy_fence(interop.copy_fence, None);
            (gl.glDeleteSemaphoresEXT)(1, &interop.gl_sem);
            (gl.glDeleteSemaphoresEXT)(1, &interop.gl_copy_sem);
            if !fbos.is_empty() {
                (gl.glDeleteFramebuffers)(fbos.len() as i32, fbos.as_ptr());
            }
        }
    }

    /// Blit the renderer planes into the exported images
    fn blit(&mut self, planes: &[GlPlane; 2]) -> Result<()> {
        let gl = &self.gl;
        let interop = &self.interop;
        let textures = [interop.planes[0].gl_texture, interop.planes[1].gl_texture];
        let layouts = [GL_LAYOUT_TRANSFER_SRC_EXT; 2];

        let _graphics = GraphicsGuard::new(self.scope.as_ref());
        unsafe {
            (gl.glWaitSemaphoreEXT)(interop.gl_copy_sem, 0, ptr::null(), 2, textures.as_ptr(), layouts.as_ptr());
            for (dst, src) in interop.planes.iter().zip(planes) {
                let read_fbo = *self
                    .read_fbos
                    .get_or_open(src.texture, |texture| Ok(gl.framebuffer_for(texture)))?;
                let (w, h) = (dst.width as i32, dst.height as i32);
                (gl.glBindFramebuffer)(GL_READ_FRAMEBUFFER, read_fbo);
                (gl.glBindFramebuffer)(GL_DRAW_FRAMEBUFFER, dst.fbo);
                (gl.glBlitFramebuffer)(0, 0, w, h, 0, 0, w, h, GL_COLOR_BUFFER_BIT, GL_NEAREST);
                (gl.glBindFramebuffer)(GL_READ_FRAMEBUFFER, 0);
                (gl.glBindFramebuffer)(GL_DRAW_FRAMEBUFFER, 0);
            }
            (gl.glSignalSemaphoreEXT)(interop.gl_sem, 0, ptr::null(), 2, textures.as_ptr(), layouts.as_ptr());
        }
        Ok(())
    }

    /// Record the copy of both planes into `target`
    fn record_copy(&self, target: &EncoderImage) -> Result<()> {
        let device = &self.vk.device;
        let cb = self.vk.command_buffer;
        let planes = &self.interop.planes;

        let acquire = |plane: &ImportedPlane| {
            vk::ImageMemoryBarrier::default()
                .old_layout(vk::ImageLayout::TRANSFER_SRC_OPTIMAL)
                .new_layout(vk::ImageLayout::TRANSFER_SRC_OPTIMAL)
                .image(plane.image)
                .subresource_range(COLOR_RANGE)
                .dst_access_mask(vk::AccessFlags::MEMORY_READ)
                .src_queue_family_index(vk::QUEUE_FAMILY_EXTERNAL)
                .dst_queue_family_index(0)
        };
        let acquire_barriers = [acquire(&planes[0]), acquire(&planes[1])];
        let release_barriers = acquire_barriers.map(|barrier| {
            barrier
                .src_access_mask(vk::AccessFlags::MEMORY_READ)
                .dst_access_mask(vk::AccessFlags::empty())
                .src_queue_family_index(0)
                .dst_queue_family_index(vk::QUEUE_FAMILY_EXTERNAL)
        });

        self.vk.begin()?;
        unsafe {
            device.cmd_pipeline_barrier(
                cb,
                vk::PipelineStageFlags::TOP_OF_PIPE,
                vk::PipelineStageFlags::TRANSFER,
                vk::DependencyFlags::empty(),
                &[],
                &[],
                &acquire_barriers,
            );

            for (plane, aspect) in planes
                .iter()
                .zip([vk::ImageAspectFlags::PLANE_0, vk::ImageAspectFlags::PLANE_1])
            {
                let region = vk::ImageCopy {
                    src_subresource: vk::ImageSubresourceLayers {
                        aspect_mask: vk::ImageAspectFlags::COLOR,
                        mip_level: 0,
                        base_array_layer: 0,
                        layer_count: 1,
                    },
                    src_offset: vk::Offset3D::default(),
                    dst_subresource: vk::ImageSubresourceLayers {
                        aspect_mask: aspect,
                        mip_level: 0,
                        base_array_layer: 0,
                        layer_count: 1,
                    },
                    dst_offset: vk::Offset3D::default(),
                    extent: vk::Extent3D {
                        width: plane.width,
                        height: plane.height,
                        depth: 1,
                    },
                };
                device.cmd_copy_image(
                    cb,
                    plane.image,
                    vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
                    target.image(),
                    vk::ImageLayout::GENERAL,
                    &[region],
                );
            }

            device.cmd_pipeline_barrier(
                cb,
                vk::PipelineStageFlags::TRANSFER,
                vk::PipelineStageFlags::BOTTOM_OF_PIPE,
                vk::DependencyFlags::empty(),
                &[],
                &[],
                &release_barriers,
            );
        }
        self.vk.end_commands()
    }

    /// Wait for the previous plane copy to leave the command buffer
    fn wait_copy(&self) -> Result<()> {
        let fence = self.interop.copy_fence;
        if fence == vk::Fence::null() {
            return Ok(());
        }
        unsafe { self.vk.device.wait_for_fences(&[fence], true, u64::MAX) }.map_err(vk_error)
    }
}

impl TextureBridge for VulkanBridge {
    type Target = EncoderImage;
    type Surface = Surface;

    fn prepare(&mut self, input: &TextureInput<'_>) -> Result<()> {
        let planes = Self::planes(input)?;
        if self.interop.ready {
            return Ok(());
        }
        self.vk.wait_idle();
        self.release_interop();
        self.create_interop(planes)
    }

    fn create_target(&mut self, input: &TextureInput<'_>) -> Result<EncoderImage> {
        let luma = Self::planes(input)?[0];
        self.wait_copy()?;
        EncoderImage::create(&self.vk, self.format, luma.width, luma.height)
    }

    fn copy(&mut self, input: &mut TextureInput<'_>, target: &mut EncoderImage) -> Result<()> {
        let planes = *Self::planes(input)?;
        self.wait_copy()?;
        self.blit(&planes)?;

        // The blit signalled `sem`, so something is submitted either way
        let recorded = self.record_copy(target);
        let wait = [self.interop.sem];
        let signal = [self.interop.copy_sem];
        let batch = Batch {
            wait: &wait,
            signal: &signal,
            commands: recorded.is_ok(),
        };
        let submitted = submit_fenced(&self.vk, batch, self.interop.copy_fence);
        if !submitted.armed {
            self.interop.ready = false;
        }
        recorded?;
        submitted.result?;

        target.surface.Sync.hSemaphore = self.interop.copy_sem.as_raw();
        target.surface.Sync.bSubmitted = true;
        Ok(())
    }

    fn wrap(&mut self, target: &mut EncoderImage) -> Result<Surface> {
        unsafe { self.amf.surface_from_vulkan(&mut *target.surface, &self.observer) }
    }

    fn wait_idle(&mut self) {
        self.vk.wait_idle();
    }

    fn destroy(&mut self, targets: Vec<EncoderImage>) {
        for target in &targets {
            unsafe { target.free(&self.vk.device) };
        }
        self.release_interop();
    }
}

impl Drop for VulkanBridge {
    fn drop(&mut self) {
        if self.interop.ready {
            self.vk.wait_idle();
            self.release_interop();
        }
        self.amf.terminate();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::{Cell, RefCell};

    /// Queue that tracks command buffer and fence state like the driver
    #[derive(Default)]
    struct FakeQueue {
        recording: Cell<bool>,
        fence_signalled: Cell<bool>,
        refused_submits: Cell<u32>,
        refuse_empty: Cell<bool>,
        batches: RefCell<Vec<bool>>,
    }

    impl CommandQueue for FakeQueue {
        fn reset_commands(&self) -> Result<()> {
            self.recording.set(false);
            Ok(())
        }

        fn begin_commands(&self) -> Result<()> {
            if self.recording.replace(true) {
                return Err(Error::Failed("command buffer is already recording"));
            }
            Ok(())
        }

        fn end_commands(&self) -> Result<()> {
            self.recording.set(false);
            Ok(())
        }

        fn reset_fence(&self, _fence: vk::Fence) -> Result<()> {
            self.fence_signalled.set(false);
            Ok(())
        }

        fn queue_batch(&self, batch: Batch<'_>, _fence: vk::Fence) -> Result<()> {
            let refused = if batch.commands {
                self.refused_submits.get() > 0
            } else {
                self.refuse_empty.get()
            };
            if refused {
                if batch.commands {
                    self.refused_submits.set(self.refused_submits.get() - 1);
                }
                return Err(vk_error(vk::Result::ERROR_DEVICE_LOST));
            }
            self.batches.borrow_mut().push(batch.commands);
            self.fence_signalled.set(true);
            Ok(())
        }
    }

    fn copy_batch<'a>(sems: &'a [vk::Semaphore; 2], commands: bool) -> Batch<'a> {
        Batch {
            wait: &sems[..1],
            signal: &sems[1..],
            commands,
        }
    }

    #[test]
    fn test_refused_submit_leaves_fence_signalled() {
        let queue = FakeQueue::default();
        queue.fence_signalled.set(true);
        queue.refused_submits.set(1);
        let sems = [vk::Semaphore::null(); 2];

        let submitted = submit_fenced(&queue, copy_batch(&sems, true), vk::Fence::null());
        assert!(submitted.result.is_err());
        assert!(submitted.armed);
        assert!(queue.fence_signalled.get());
        assert_eq!(*queue.batches.borrow(), vec![false]);

        // The next frame's wait returns and its copy goes through
        let submitted = submit_fenced(&queue, copy_batch(&sems, true), vk::Fence::null());
        assert!(submitted.result.is_ok());
        assert!(submitted.armed);
        assert_eq!(*queue.batches.borrow(), vec![false, true]);
    }

    #[test]
    fn test_unrecorded_copy_still_signals() {
        let queue = FakeQueue::default();
        let sems = [vk::Semaphore::null(); 2];

        let submitted = submit_fenced(&queue, copy_batch(&sems, false), vk::Fence::null());
        assert!(submitted.result.is_ok());
        assert!(submitted.armed);
        assert!(queue.fence_signalled.get());
    }

    #[test]
    fn test_unsignalled_fence_is_disarmed() {
        let queue = FakeQueue::default();
        queue.refused_submits.set(1);
        queue.refuse_empty.set(true);
        let sems = [vk::Semaphore::null(); 2];

        let submitted = submit_fenced(&queue, copy_batch(&sems, true), vk::Fence::null());
        assert!(submitted.result.is_err());
        assert!(!submitted.armed);
        assert!(!queue.fence_signalled.get());
    }

    #[test]
    fn test_begin_after_abandoned_recording() {
        let queue = FakeQueue::default();
        begin_recording(&queue).unwrap();
        // An error exit left the buffer recording
        assert!(queue.begin_commands().is_err());

        begin_recording(&queue).unwrap();
        queue.end_commands().unwrap();
        begin_recording(&queue).unwrap();
    }

    #[test]
    fn test_surface_formats() {
        assert_eq!(
            surface_vk_format(SurfaceFormat::Nv12).unwrap(),
            vk::Format::G8_B8R8_2PLANE_420_UNORM
        );
        assert_eq!(
            surface_vk_format(SurfaceFormat::P010).unwrap(),
            vk::Format::G16_B16R16_2PLANE_420_UNORM
        );
        assert!(surface_vk_format(SurfaceFormat::Bgra).is_err());
    }

    #[test]
    fn test_plane_formats() {
        assert_eq!(plane_vk_format(PlaneFormat::R8), vk::Format::R8_UNORM);
        assert_eq!(plane_vk_format(PlaneFormat::Rg16), vk::Format::R16G16_UNORM);
    }

    #[test]
    fn test_surface_description_layout() {
        assert_eq!(size_of::<AMFVulkanSync>(), 40);
        assert_eq!(size_of::<AMFVulkanSurface>(), 104);
    }
}
