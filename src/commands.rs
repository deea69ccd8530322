//! Command catalog.
//!
//! Identifier constants for the commands NLED controllers understand, and
//! builders that attach the right continuation to each one. Ack-only
//! commands are built with [`simple`]; the `request_*` builders cover the
//! commands that exchange a payload.
//!
//! ```
//! use aurora_client::commands;
//!
//! let cmd = commands::request_channel_values(0, 512, |values| {
//!     assert_eq!(values.len(), 512);
//! });
//! assert_eq!(cmd.data(), [0, 0, 2, 0]);
//! ```

use std::sync::Arc;

use bytes::Bytes;

use crate::error::Result;
use crate::session::{AckEffect, Command, PayloadOutcome, Segment, Upload};

/// Device info: hardware id, firmware version, bootloader version.
pub const DEVICE_INFO: u8 = 4;
/// Set the user id number.
pub const USER_ID: u8 = 5;
/// Device status block.
pub const DEVICE_STATUS: u8 = 6;
/// Pixel packet clone count.
pub const PIXEL_CLONE: u8 = 10;
/// Global output intensity.
pub const INTENSITY: u8 = 15;
/// Enter or leave live control.
pub const LIVE_MODE: u8 = 60;
/// Blank all outputs.
pub const OUTPUTS_BLANK: u8 = 61;
/// Read current channel values.
pub const CHANNEL_VALUES: u8 = 69;
/// Set playback speed.
pub const SPEED_SET: u8 = 70;
/// Decrease playback speed.
pub const SPEED_DECREASE: u8 = 71;
/// Increase playback speed.
pub const SPEED_INCREASE: u8 = 72;
/// Toggle play/pause.
pub const PLAY_PAUSE: u8 = 75;
/// Toggle outputs on/off.
pub const ON_OFF: u8 = 76;
/// Set the color order.
pub const COLOR_ORDER: u8 = 81;
/// Step one frame.
pub const STEP: u8 = 82;
/// Fade to a value.
pub const FADE: u8 = 85;
/// Jump to a frame number.
pub const FRAME_NUMBER: u8 = 86;
/// Select a sequence.
pub const SEQUENCE_SELECT: u8 = 90;
/// Previous sequence.
pub const SEQUENCE_PREVIOUS: u8 = 91;
/// Next sequence.
pub const SEQUENCE_NEXT: u8 = 92;
/// Hardware profile upload.
pub const HWPV_UPLOAD: u8 = 99;
/// Index table and sequence upload.
pub const FULL_UPLOAD: u8 = 100;
/// Configuration block upload.
pub const CONFIG_UPLOAD: u8 = 101;
/// Gamma table upload.
pub const GAMMA_UPLOAD: u8 = 102;
/// Full download, size request.
pub const FULL_DOWNLOAD_PREP: u8 = 105;
/// Full download, data.
pub const FULL_DOWNLOAD: u8 = 106;
/// Set every channel to one RGBW value.
pub const CHANNELS_TO_VALUE: u8 = 111;
/// Read the ADC.
pub const ADC_VALUE: u8 = 112;
/// Configuration block download.
pub const CONFIG_DOWNLOAD: u8 = 120;
/// Reset the configuration to defaults.
pub const CONFIG_DEFAULT: u8 = 121;
/// Read the serial number.
pub const SERIAL_NUMBER: u8 = 122;
/// Reset into the bootloader.
pub const BOOTLOADER: u8 = 140;
/// Put an external device into its bootloader.
pub const EXTERNAL_BOOTLOADER: u8 = 141;

/// Device info payload length.
pub const DEVICE_INFO_LEN: usize = 7;
/// Serial number payload length.
pub const SERIAL_NUMBER_LEN: usize = 4;
/// ADC payload length: frame value, MSB, LSB.
pub const ADC_VALUE_LEN: usize = 3;
/// Full download size prefix length (big-endian u32).
const FULL_DOWNLOAD_SIZE_LEN: usize = 4;

/// High byte of a 16-bit argument.
#[inline]
pub fn msb16(value: u16) -> u8 {
    (value >> 8) as u8
}

/// Low byte of a 16-bit argument.
#[inline]
pub fn lsb16(value: u16) -> u8 {
    (value & 0xFF) as u8
}

/// Ack-only command.
pub fn simple(id: u8, data: [u8; 4]) -> Command {
    Command::new(id, data)
}

/// Collect `len` bytes and hand them to `f`.
fn receive<F>(id: u8, data: [u8; 4], len: usize, f: F) -> Command
where
    F: Fn(&[u8]) + Send + Sync + 'static,
{
    Command::new(id, data)
        .expect_payload(len)
        .on_payload(move |payload| {
            f(payload);
            PayloadOutcome::Done
        })
}

/// Set global intensity.
pub fn intensity(value: u8) -> Command {
    simple(INTENSITY, [value, 0, 0, 0])
}

/// Set playback speed.
pub fn speed(value: u16) -> Command {
    simple(SPEED_SET, [msb16(value), lsb16(value), 0, 0])
}

/// Select a sequence by its 1-based id.
pub fn sequence(id: u8) -> Command {
    simple(SEQUENCE_SELECT, [id.saturating_sub(1), 0, 0, 0])
}

/// Switch to the idle sequence.
pub fn idle_sequence() -> Command {
    simple(SEQUENCE_SELECT, [0, 1, 0, 0])
}

/// Jump to `frame` in the current sequence.
pub fn frame_number(frame: u16, flags: u8) -> Command {
    simple(FRAME_NUMBER, [msb16(frame), lsb16(frame), flags, 0])
}

/// Set every channel to the given RGBW value.
pub fn channels_to_value(r: u8, g: u8, b: u8, w: u8) -> Command {
    simple(CHANNELS_TO_VALUE, [r, g, b, w])
}

/// Enter or leave live control for `channels` channels.
///
/// Once acknowledged, live frames of up to `channels` bytes are sent with
/// [`Session::write_live`](crate::Session::write_live). Leaving live control
/// closes it to every frame.
pub fn live_mode(enable: bool, sixteen_bit: bool, channels: u16) -> Command {
    let open = if enable { channels } else { 0 };
    simple(
        LIVE_MODE,
        [
            u8::from(enable),
            u8::from(sixteen_bit),
            msb16(channels),
            lsb16(channels),
        ],
    )
    .ack_effect(AckEffect::LiveChannels(open))
}

/// Reset the device into its bootloader.
///
/// The device drops the link after acknowledging, so the port is closed
/// and anything queued is dropped.
pub fn bootloader() -> Command {
    simple(BOOTLOADER, [0; 4]).ack_effect(AckEffect::ClosePort)
}

/// Put an external device into its bootloader.
///
/// Another program takes over the link, so the port is closed after the
/// acknowledge.
pub fn external_bootloader() -> Command {
    simple(EXTERNAL_BOOTLOADER, [0; 4]).ack_effect(AckEffect::ClosePort)
}

/// Read the 7-byte device info block.
pub fn request_device_info<F>(f: F) -> Command
where
    F: Fn(&[u8]) + Send + Sync + 'static,
{
    receive(DEVICE_INFO, [0; 4], DEVICE_INFO_LEN, f)
}

/// Device status. The length depends on firmware.
pub fn request_device_status<F>(len: usize, f: F) -> Command
where
    F: Fn(&[u8]) + Send + Sync + 'static,
{
    receive(DEVICE_STATUS, [0; 4], len, f)
}

/// Read `count` channel values starting at `start`.
pub fn request_channel_values<F>(start: u16, count: u16, f: F) -> Command
where
    F: Fn(&[u8]) + Send + Sync + 'static,
{
    receive(
        CHANNEL_VALUES,
        [msb16(start), lsb16(start), msb16(count), lsb16(count)],
        usize::from(count),
        f,
    )
}

/// Read the 4-byte serial number.
pub fn request_serial_number<F>(f: F) -> Command
where
    F: Fn(&[u8]) + Send + Sync + 'static,
{
    receive(SERIAL_NUMBER, [0; 4], SERIAL_NUMBER_LEN, f)
}

/// Read the ADC value.
pub fn request_adc_value<F>(f: F) -> Command
where
    F: Fn(&[u8]) + Send + Sync + 'static,
{
    receive(ADC_VALUE, [0; 4], ADC_VALUE_LEN, f)
}

/// Read the device configuration block (`len` bytes for this model).
pub fn request_config_download<F>(len: usize, f: F) -> Command
where
    F: Fn(&[u8]) + Send + Sync + 'static,
{
    receive(CONFIG_DOWNLOAD, [0; 4], len, f)
}

/// Write the configuration block as a single packet.
pub fn request_config_upload<F>(config: impl Into<Bytes>, f: F) -> Result<Command>
where
    F: Fn() + Send + Sync + 'static,
{
    let upload = Upload::single(Segment::whole(config))?;
    Ok(Command::new(CONFIG_UPLOAD, [0; 4])
        .upload(upload)
        .on_packet_ack(f))
}

/// Upload `packets` gamma table packets of `packet_size` bytes.
pub fn request_gamma_upload<F>(
    packets: u8,
    packet_size: usize,
    table: impl Into<Bytes>,
    f: F,
) -> Result<Command>
where
    F: Fn() + Send + Sync + 'static,
{
    let upload = Upload::single(Segment::new(table, packet_size, usize::from(packets)))?;
    Ok(Command::new(GAMMA_UPLOAD, [packets, 0, 0, 0])
        .upload(upload)
        .on_packet_ack(f))
}

/// Upload a hardware profile image.
pub fn request_hwpv_upload<F>(
    packets: u16,
    packet_size: usize,
    image: impl Into<Bytes>,
    f: F,
) -> Result<Command>
where
    F: Fn() + Send + Sync + 'static,
{
    let upload = Upload::single(Segment::new(image, packet_size, usize::from(packets)))?;
    Ok(Command::new(HWPV_UPLOAD, [msb16(packets), lsb16(packets), 0, 0])
        .upload(upload)
        .on_packet_ack(f))
}

/// Parameters of a full sequence upload.
#[derive(Debug, Clone)]
pub struct FullUpload {
    /// Index table.
    pub index: Bytes,
    /// Packets in the index table.
    pub index_packets: u16,
    /// Packet size for the index table.
    pub index_packet_size: usize,
    /// Sequence data.
    pub sequences: Bytes,
    /// Packets in the sequence data.
    pub sequence_packets: u16,
    /// Packet size for the sequence data.
    pub sequence_packet_size: usize,
    /// Number of sequences.
    pub max_sequence: u8,
    /// Sequence played when idle.
    pub idle_sequence: u8,
}

/// Upload index table and sequences in one transaction.
///
/// The command carries the combined packet count; packets are numbered
/// across both buffers.
pub fn request_full_upload<F>(params: FullUpload, f: F) -> Result<Command>
where
    F: Fn() + Send + Sync + 'static,
{
    let total = params.index_packets.saturating_add(params.sequence_packets);
    let upload = Upload::merged(
        Segment::new(
            params.index,
            params.index_packet_size,
            usize::from(params.index_packets),
        ),
        Segment::new(
            params.sequences,
            params.sequence_packet_size,
            usize::from(params.sequence_packets),
        ),
    )?;
    Ok(Command::new(
        FULL_UPLOAD,
        [
            msb16(total),
            lsb16(total),
            params.max_sequence,
            params.idle_sequence,
        ],
    )
    .upload(upload)
    .on_packet_ack(f))
}

/// Download index and sequences.
///
/// Two commands: the first returns the transfer size as a big-endian u32,
/// the second streams that many bytes.
pub fn request_full_download<F>(f: F) -> Command
where
    F: Fn(&[u8]) + Send + Sync + 'static,
{
    let f = Arc::new(f);
    Command::new(FULL_DOWNLOAD_PREP, [0; 4])
        .expect_payload(FULL_DOWNLOAD_SIZE_LEN)
        .on_payload(move |size| {
            let len = match size {
                [a, b, c, d] => u32::from_be_bytes([*a, *b, *c, *d]) as usize,
                _ => 0,
            };
            tracing::debug!("Full download size {}", len);
            let f = f.clone();
            PayloadOutcome::Then(
                Command::new(FULL_DOWNLOAD, [0; 4])
                    .expect_payload(len)
                    .on_payload(move |data| {
                        f(data);
                        PayloadOutcome::Done
                    }),
            )
        })
}
