//! Capability probe
//!
//! Runs out of process so a crashing driver cannot take the host down.
//! Prints one INI section per adapter, or an `[error]` section.

use anyhow::Context as _;
use obs_amf::caps::error_ini;
use obs_amf::runtime::Context;
use obs_amf::{AdapterCaps, AmfRuntime, CapsTable, Codec};
use std::sync::Arc;

fn main() -> anyhow::Result<()> {
    let ini = match probe() {
        Ok(caps) => caps.to_ini(),
        Err(err) => error_ini(&err.to_string()),
    };
    print!("{ini}");
    Ok(())
}

/// Query the codecs on a context already bound to a device
fn codec_caps(runtime: &Arc<AmfRuntime>, context: &Context) -> AdapterCaps {
    let has = |codec| runtime.create_component(context, codec).is_ok();
    AdapterCaps {
        is_amd: true,
        supports_avc: has(Codec::Avc),
        supports_hevc: has(Codec::Hevc),
        supports_av1: has(Codec::Av1),
    }
}

#[cfg(target_os = "linux")]
fn probe() -> anyhow::Result<CapsTable> {
    obs_amf::interop::vulkan::check_amd_driver()?;
    let runtime = AmfRuntime::load().context("Failed to load AMF lib")?;

    // The runtime picks the device itself, so only one adapter is reported
    let caps = match runtime.create_context() {
        Ok(context) => {
            let caps = match context.init_vulkan(std::ptr::null_mut()) {
                Ok(()) => codec_caps(&runtime, &context),
                Err(_) => AdapterCaps::default(),
            };
            context.terminate();
            caps
        }
        Err(_) => AdapterCaps::default(),
    };
    Ok(CapsTable::new(vec![caps]))
}

#[cfg(windows)]
fn probe() -> anyhow::Result<CapsTable> {
    use obs_amf::interop::d3d11;

    let runtime = AmfRuntime::load().context("Failed to load AMF lib")?;
    let vendors = d3d11::adapter_vendors().context("Failed to enumerate adapters")?;

    let adapters = vendors
        .iter()
        .enumerate()
        .map(|(index, &vendor)| {
            if vendor != d3d11::AMD_VENDOR_ID {
                return Ok(AdapterCaps::default());
            }
            let device = match d3d11::create_device(index as u32) {
                Ok(device) => device,
                Err(_) => return Ok(AdapterCaps::default()),
            };
            let context = runtime.create_context()?;
            let caps = match context.init_dx11(device.as_raw()) {
                Ok(()) => codec_caps(&runtime, &context),
                Err(_) => AdapterCaps {
                    is_amd: true,
                    ..Default::default()
                },
            };
            context.terminate();
            Ok(caps)
        })
        .collect::<anyhow::Result<Vec<_>>>()?;
    Ok(CapsTable::new(adapters))
}

#[cfg(not(any(windows, target_os = "linux")))]
fn probe() -> anyhow::Result<CapsTable> {
    anyhow::bail!("AMF is not available on this platform")
}
