//! Controller handles bound to the right protocol variant.
//!
//! [`GcsDevice::open`] connects, probes whether the controller speaks
//! GCS 2.0 or GCS 2.1, and binds the matching command layer and error code
//! space. Daisy chains are probed through their master first, then reopened
//! as a shared port that hands out one handle per device id.

use std::thread;
use std::time::Duration;

use tracing::{debug, info};

use crate::commands::GcsCommands;
use crate::config::ConnectionSettings;
use crate::core::GcsCore;
use crate::error::{GcsError, GcsResult, Syntax};
use crate::gcs2::Gcs2Commands;
use crate::gcs21::Gcs21Commands;
use crate::messages::GcsMessages;
use crate::transport::{DaisyChain, DaisyDevice, Interface, Transport};
use crate::values::parse_float;

/// Controllers that only speak GCS 1, matched against the full model name.
const GCS1_DEVICES: &[&str] = &[
    "C-702.00", "C-843", "C-848", "C-880", "E-516", "E-517", "E-621", "E-625", "E-665", "E-710",
    "E-761", "E-816", "HYDRA", "MERCURY", "POLLUX", "TAMBO",
];

/// GCS 2.0 controller families, matched against the model before its first `.`.
const GCS2_DEVICES: &[&str] = &[
    "C-413", "C-663", "C-863", "C-867", "C-877", "C-884", "C-885", "C-887", "E-709", "E-712",
    "E-723", "E-725", "E-727", "E-753", "E-754", "E-755", "E-861", "E-871", "E-873",
];

/// Decide the protocol variant from `CSV?`, falling back to `*IDN?`.
///
/// Any failure of both probes reports GCS 2.0.
pub fn detect_syntax(msgs: &mut GcsMessages) -> Syntax {
    let by_csv = msgs
        .read("CSV?")
        .and_then(|csv| parse_float(csv.trim()))
        .map(|version| version > 2.0);
    let gcs21 = match by_csv {
        Ok(gcs21) => gcs21,
        Err(e) => {
            debug!("CSV? failed ({e}), probing *IDN?");
            msgs.read("*IDN?")
                .and_then(|idn| gcs21_by_idn(&idn))
                .unwrap_or_else(|e| {
                    debug!("*IDN? probe failed ({e}), assuming GCS 2.0");
                    false
                })
        }
    };
    if gcs21 {
        Syntax::Gcs21
    } else {
        Syntax::Gcs2
    }
}

/// GCS 2.1 firmware reports a four-part version in the fourth `*IDN?` field.
fn gcs21_by_idn(idn: &str) -> GcsResult<bool> {
    let fields: Vec<&str> = idn.trim().split(',').map(str::trim).collect();
    let unexpected = || GcsError::InvalidResponse(format!("unexpected *IDN? answer {idn:?}"));
    let model = fields.get(1).ok_or_else(unexpected)?;
    if GCS1_DEVICES.contains(model) {
        return Ok(false);
    }
    let family = model.split('.').next().unwrap_or_default();
    if GCS2_DEVICES.contains(&family) {
        return Ok(false);
    }
    let version = fields.get(3).ok_or_else(unexpected)?;
    Ok(version.split('.').count() >= 4)
}

/// Options for [`GcsDevice::open_daisy_chain`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DaisyChainOptions {
    /// Wait between closing the master probe and reopening the chain.
    pub open_delay: Duration,
    /// Answer timeout per device id during enumeration.
    pub probe_timeout: Duration,
}

impl Default for DaisyChainOptions {
    fn default() -> Self {
        Self {
            open_delay: Duration::ZERO,
            probe_timeout: Duration::from_millis(300),
        }
    }
}

/// An open daisy chain and the devices found on it.
pub struct DaisyChainConnection {
    chain: DaisyChain,
    devices: Vec<DaisyDevice>,
    syntax: Syntax,
    settings: ConnectionSettings,
}

impl DaisyChainConnection {
    /// Devices that answered `*IDN?`.
    pub fn devices(&self) -> &[DaisyDevice] {
        &self.devices
    }

    /// Protocol variant probed on the master.
    pub fn syntax(&self) -> Syntax {
        self.syntax
    }

    /// Handle for device `id`, sharing the chain's port.
    pub fn connect(&self, id: u8) -> GcsResult<GcsDevice> {
        let transport = Box::new(self.chain.device(id));
        let mut msgs = GcsMessages::new(transport, self.settings.clone())?;
        msgs.connect()?;
        Ok(GcsDevice::bind(GcsCore::new(msgs), self.syntax))
    }

    /// Close the shared port; every handle on it fails afterwards.
    pub fn close(&self) -> GcsResult<()> {
        self.chain.close()
    }
}

/// A controller handle speaking GCS 2.0 or GCS 2.1.
pub enum GcsDevice {
    Gcs2(Gcs2Commands),
    Gcs21(Gcs21Commands),
}

impl GcsCommands for GcsDevice {
    fn core(&mut self) -> &mut GcsCore {
        match self {
            GcsDevice::Gcs2(dev) => dev.core(),
            GcsDevice::Gcs21(dev) => dev.core(),
        }
    }

    fn core_ref(&self) -> &GcsCore {
        match self {
            GcsDevice::Gcs2(dev) => dev.core_ref(),
            GcsDevice::Gcs21(dev) => dev.core_ref(),
        }
    }

    fn invalidate_schema(&mut self) {
        match self {
            GcsDevice::Gcs2(dev) => dev.invalidate_schema(),
            GcsDevice::Gcs21(dev) => dev.invalidate_schema(),
        }
    }
}

impl GcsDevice {
    /// Connect over `interface` and bind the probed protocol variant.
    pub fn open(interface: &Interface, settings: ConnectionSettings) -> GcsResult<Self> {
        info!("Connecting to {interface}");
        Self::from_transport(interface.transport()?, settings)
    }

    /// Connect over a caller-supplied transport (GPIB, PCI, custom links).
    pub fn from_transport(transport: Box<dyn Transport>, settings: ConnectionSettings) -> GcsResult<Self> {
        let mut msgs = GcsMessages::new(transport, settings)?;
        msgs.connect()?;
        let syntax = detect_syntax(&mut msgs);
        info!("{} speaks {syntax}", msgs.describe());
        Ok(Self::bind(GcsCore::new(msgs), syntax))
    }

    /// Connect without probing.
    pub fn with_syntax(
        transport: Box<dyn Transport>,
        settings: ConnectionSettings,
        syntax: Syntax,
    ) -> GcsResult<Self> {
        let mut msgs = GcsMessages::new(transport, settings)?;
        msgs.connect()?;
        Ok(Self::bind(GcsCore::new(msgs), syntax))
    }

    fn bind(core: GcsCore, syntax: Syntax) -> Self {
        match syntax {
            Syntax::Gcs2 => GcsDevice::Gcs2(Gcs2Commands::new(core)),
            Syntax::Gcs21 => GcsDevice::Gcs21(Gcs21Commands::new(core)),
        }
    }

    /// Probe the chain master on `interface`, then open it as a daisy chain.
    pub fn open_daisy_chain(
        interface: &Interface,
        settings: ConnectionSettings,
        options: DaisyChainOptions,
    ) -> GcsResult<DaisyChainConnection> {
        Self::open_daisy_chain_with(|| interface.transport(), settings, options)
    }

    /// Like [`open_daisy_chain`](Self::open_daisy_chain) with a transport
    /// factory, called once for the probe and once for the chain.
    pub fn open_daisy_chain_with(
        mut make_transport: impl FnMut() -> GcsResult<Box<dyn Transport>>,
        settings: ConnectionSettings,
        options: DaisyChainOptions,
    ) -> GcsResult<DaisyChainConnection> {
        let syntax = {
            let mut master = GcsMessages::new(make_transport()?, settings.clone())?;
            master.connect()?;
            let syntax = detect_syntax(&mut master);
            master.close()?;
            syntax
        };
        if !options.open_delay.is_zero() {
            debug!("Waiting {:?} before reopening the daisy chain", options.open_delay);
            thread::sleep(options.open_delay);
        }
        let chain = DaisyChain::open(make_transport()?)?;
        let devices = chain.enumerate_with_timeout(options.probe_timeout)?;
        info!("Daisy chain on {} has {} devices", chain.describe(), devices.len());
        Ok(DaisyChainConnection {
            chain,
            devices,
            syntax,
            settings,
        })
    }

    /// GCS 2.0 commands, or `Unsupported` on a GCS 2.1 controller.
    pub fn as_gcs2(&mut self) -> GcsResult<&mut Gcs2Commands> {
        match self {
            GcsDevice::Gcs2(dev) => Ok(dev),
            GcsDevice::Gcs21(_) => Err(GcsError::Unsupported(
                "GCS 2.0 command on a GCS 2.1 controller".to_string(),
            )),
        }
    }

    /// GCS 2.1 commands, or `Unsupported` on a GCS 2.0 controller.
    pub fn as_gcs21(&mut self) -> GcsResult<&mut Gcs21Commands> {
        match self {
            GcsDevice::Gcs21(dev) => Ok(dev),
            GcsDevice::Gcs2(_) => Err(GcsError::Unsupported(
                "GCS 2.1 command on a GCS 2.0 controller".to_string(),
            )),
        }
    }

    /// Model name from `*IDN?`.
    pub fn devname(&mut self) -> GcsResult<String> {
        self.core().controller_name()
    }

    pub fn is_connected(&self) -> bool {
        self.core_ref().messages().is_connected()
    }

    /// Close the connection. Commands reopen it.
    pub fn close(&mut self) -> GcsResult<()> {
        self.core().messages_mut().close()
    }
}
