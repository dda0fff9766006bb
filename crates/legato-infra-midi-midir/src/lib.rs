use legato_ports::midi::{MidiError, MidiInputPort, MidiInputSource, RawMidiMessage};
use legato_ports::types::{DeviceId, MidiInputDevice};
use midir::{Ignore, MidiInput, MidiInputConnection};
use parking_lot::Mutex;
use rtrb::{Consumer, Producer, RingBuffer};
use std::sync::Arc;
use tracing::{debug, warn};

pub const INPUT_QUEUE_CAPACITY: usize = 2048;

type SharedProducer = Arc<Mutex<Producer<RawMidiMessage>>>;

pub struct MidirMidiInputPort {
    client_name: String,
}

impl MidirMidiInputPort {
    pub fn new(client_name: impl Into<String>) -> Self {
        Self {
            client_name: client_name.into(),
        }
    }

    fn create_midi_in(&self) -> Result<MidiInput, MidiError> {
        let midi_in = MidiInput::new(&self.client_name)
            .map_err(|e| MidiError::Backend(e.to_string()))?;
        Ok(midi_in)
    }

    fn device_id(index: usize, name: &str) -> DeviceId {
        DeviceId(format!("midir:{}:{}", index, name))
    }
}

impl Default for MidirMidiInputPort {
    fn default() -> Self {
        Self::new("Legato")
    }
}

/// Channel-voice messages only; system and realtime bytes (clock, sysex)
/// never reach the capture loop.
pub fn parse_message(message: &[u8]) -> Option<RawMidiMessage> {
    let status = *message.first()?;
    if !(0x80..0xF0).contains(&status) {
        return None;
    }
    RawMidiMessage::from_bytes(message)
}

/// Polling view over a midir connection. The backend callback pushes into
/// a ring buffer that `read` drains.
pub struct MidirMidiInputSource {
    connection: Option<MidiInputConnection<SharedProducer>>,
    consumer: Consumer<RawMidiMessage>,
}

impl MidiInputSource for MidirMidiInputSource {
    fn poll(&mut self) -> Result<bool, MidiError> {
        Ok(!self.consumer.is_empty())
    }

    fn read(&mut self, max_events: usize) -> Result<Vec<RawMidiMessage>, MidiError> {
        let mut out = Vec::with_capacity(max_events.min(self.consumer.slots()));
        while out.len() < max_events {
            match self.consumer.pop() {
                Ok(message) => out.push(message),
                Err(_) => break,
            }
        }
        Ok(out)
    }

    fn close(mut self: Box<Self>) {
        if let Some(connection) = self.connection.take() {
            let _ = connection.close();
            debug!("midi input closed");
        }
    }
}

impl MidiInputPort for MidirMidiInputPort {
    fn list_inputs(&self) -> Result<Vec<MidiInputDevice>, MidiError> {
        let midi_in = self.create_midi_in()?;
        let ports = midi_in.ports();
        let mut devices = Vec::new();

        for (index, port) in ports.iter().enumerate() {
            let name = midi_in
                .port_name(port)
                .unwrap_or_else(|_| "Unknown Input".to_string());
            devices.push(MidiInputDevice {
                id: Self::device_id(index, &name),
                name,
                is_available: true,
            });
        }

        Ok(devices)
    }

    fn open_input(&self, device_id: &DeviceId) -> Result<Box<dyn MidiInputSource>, MidiError> {
        let mut midi_in = self.create_midi_in()?;
        midi_in.ignore(Ignore::All);

        let ports = midi_in.ports();
        let mut selected = None;
        for (index, port) in ports.iter().enumerate() {
            let name = midi_in
                .port_name(port)
                .unwrap_or_else(|_| "Unknown Input".to_string());
            let id = Self::device_id(index, &name);
            if &id == device_id {
                selected = Some(port.clone());
                break;
            }
        }

        let port = selected.ok_or_else(|| MidiError::DeviceNotFound(device_id.to_string()))?;

        let (producer, consumer) = RingBuffer::new(INPUT_QUEUE_CAPACITY);
        let producer: SharedProducer = Arc::new(Mutex::new(producer));
        let connection = midi_in
            .connect(
                &port,
                "legato-midi-input",
                move |_stamp, message, producer| {
                    let Some(message) = parse_message(message) else {
                        return;
                    };
                    if let Some(mut guard) = producer.try_lock() {
                        if guard.push(message).is_err() {
                            warn!("midi input queue full, message dropped");
                        }
                    }
                },
                producer,
            )
            .map_err(|e| MidiError::Backend(e.to_string()))?;

        debug!(device = %device_id, "midi input opened");
        Ok(Box::new(MidirMidiInputSource {
            connection: Some(connection),
            consumer,
        }))
    }
}
