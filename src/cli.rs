//! Interactive REPL driving the simulated host
//!
//! Each line is parsed into a [`ReplCommand`]. Host mutations go straight to the
//! [`SimulatedHost`], whose listeners feed the bridge exactly like a real host;
//! keyboard input and display requests are posted to the bridge's event channel.

use anyhow::{anyhow, bail, Context, Result};
use colored::Colorize;
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tracing::debug;

use kontrol_bridge::bridge::BridgeEvent;
use kontrol_bridge::config::NativePluginConfig;
use kontrol_bridge::focus::InstrumentScanner;
use kontrol_bridge::host::{Device, Host, SimulatedHost, TrackId};
use kontrol_bridge::midi::MidiMessage;
use kontrol_bridge::navigation::{NavDirection, NAV_LEFT_CC, NAV_RIGHT_CC};

const HELP: &str = "\
Commands:
  tracks                          list tracks
  arm <id> | disarm <id>          set or clear a track's arm
  implicit <id> on|off            set or clear implicit arm
  devices <id> none               remove all devices
  devices <id> kontrol <instance> load the native plugin
  devices <id> <name...>          load another instrument
  select <id>                     select a track
  nav left|right                  press an arrow button
  play | stop                     start or stop the transport
  text <grid> <text...>           write a display line
  focus                           log the current focus
  help | quit";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceSpec {
    None,
    Kontrol { instance: String },
    Instrument { name: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplCommand {
    Tracks,
    Arm(u64),
    Disarm(u64),
    Implicit(u64, bool),
    Devices(u64, DeviceSpec),
    Select(u64),
    Nav(NavDirection),
    Play,
    Stop,
    Text { grid: u8, text: String },
    Focus,
    Help,
    Quit,
}

impl ReplCommand {
    /// Parse one input line; `Ok(None)` for blank lines
    pub fn parse(line: &str) -> Result<Option<Self>> {
        let mut words = line.split_whitespace();
        let Some(command) = words.next() else {
            return Ok(None);
        };
        let rest: Vec<&str> = words.collect();

        let command = match command.to_lowercase().as_str() {
            "tracks" | "ls" => Self::Tracks,
            "arm" => Self::Arm(track_id(&rest)?),
            "disarm" => Self::Disarm(track_id(&rest)?),
            "implicit" => {
                let id = track_id(&rest)?;
                let on = match rest.get(1).copied() {
                    Some("on") => true,
                    Some("off") => false,
                    _ => bail!("usage: implicit <id> on|off"),
                };
                Self::Implicit(id, on)
            }
            "devices" => {
                let id = track_id(&rest)?;
                let spec = match rest.get(1..).unwrap_or_default() {
                    [] => bail!("usage: devices <id> none|kontrol <instance>|<name...>"),
                    ["none"] => DeviceSpec::None,
                    ["kontrol", instance] => DeviceSpec::Kontrol {
                        instance: instance.to_string(),
                    },
                    name => DeviceSpec::Instrument {
                        name: name.join(" "),
                    },
                };
                Self::Devices(id, spec)
            }
            "select" => Self::Select(track_id(&rest)?),
            "nav" => match rest.first().copied() {
                Some("left") | Some("l") => Self::Nav(NavDirection::Left),
                Some("right") | Some("r") => Self::Nav(NavDirection::Right),
                _ => bail!("usage: nav left|right"),
            },
            "play" => Self::Play,
            "stop" => Self::Stop,
            "text" => {
                let grid = rest
                    .first()
                    .ok_or_else(|| anyhow!("usage: text <grid> <text...>"))?
                    .parse::<u8>()
                    .context("grid must be a number")?;
                Self::Text {
                    grid,
                    text: rest[1..].join(" "),
                }
            }
            "focus" => Self::Focus,
            "help" | "?" => Self::Help,
            "quit" | "exit" => Self::Quit,
            other => bail!("unknown command '{}' (try 'help')", other),
        };
        Ok(Some(command))
    }
}

fn track_id(args: &[&str]) -> Result<u64> {
    let raw = args.first().ok_or_else(|| anyhow!("missing track id"))?;
    raw.trim_start_matches('#')
        .parse()
        .with_context(|| format!("invalid track id '{}'", raw))
}

/// What the REPL acts upon
pub struct ReplContext {
    host: Arc<SimulatedHost>,
    events: mpsc::UnboundedSender<BridgeEvent>,
    native: NativePluginConfig,
    scanner: InstrumentScanner,
}

impl ReplContext {
    pub fn new(
        host: Arc<SimulatedHost>,
        events: mpsc::UnboundedSender<BridgeEvent>,
        native: &NativePluginConfig,
    ) -> Self {
        Self {
            host,
            events,
            native: native.clone(),
            scanner: InstrumentScanner::new(native),
        }
    }

    /// Run a command; returns `false` when the REPL should exit
    pub fn execute(&self, command: ReplCommand) -> Result<bool> {
        debug!("REPL command: {:?}", command);
        match command {
            ReplCommand::Tracks => self.print_tracks(),
            ReplCommand::Arm(id) => self.host.set_arm(TrackId(id), true)?,
            ReplCommand::Disarm(id) => self.host.set_arm(TrackId(id), false)?,
            ReplCommand::Implicit(id, on) => self.host.set_implicit_arm(TrackId(id), on)?,
            ReplCommand::Devices(id, spec) => {
                self.host.set_devices(TrackId(id), self.devices_for(spec))?
            }
            ReplCommand::Select(id) => self.host.select_track(TrackId(id))?,
            ReplCommand::Nav(direction) => {
                let cc = match direction {
                    NavDirection::Left => NAV_LEFT_CC,
                    NavDirection::Right => NAV_RIGHT_CC,
                };
                let press = MidiMessage::ControlChange {
                    channel: 0,
                    cc,
                    value: 127,
                };
                self.post(BridgeEvent::HardwareMidi(press.encode()))?;
            }
            ReplCommand::Play => self.host.set_playing(true),
            ReplCommand::Stop => self.host.stop_playing(),
            ReplCommand::Text { grid, text } => self.post(BridgeEvent::DisplayText { text, grid })?,
            ReplCommand::Focus => self.post(BridgeEvent::ReportFocus)?,
            ReplCommand::Help => println!("{}", HELP),
            ReplCommand::Quit => return Ok(false),
        }
        Ok(true)
    }

    fn post(&self, event: BridgeEvent) -> Result<()> {
        self.events
            .send(event)
            .map_err(|_| anyhow!("bridge is not running"))
    }

    fn devices_for(&self, spec: DeviceSpec) -> Vec<Device> {
        match spec {
            DeviceSpec::None => Vec::new(),
            DeviceSpec::Kontrol { instance } => {
                let class = self
                    .native
                    .plugin_classes
                    .first()
                    .map(String::as_str)
                    .unwrap_or("PluginDevice");
                let tagged = format!("{}{}", self.native.parameter_tag, instance);
                vec![Device::instrument(class, &self.native.display_prefix)
                    .with_parameters(&["Device On", &tagged])]
            }
            DeviceSpec::Instrument { name } => vec![Device::instrument("PluginDevice", &name)],
        }
    }

    fn print_tracks(&self) {
        let song = self.host.snapshot();
        println!(
            "{} ({})",
            "Tracks".bold(),
            if song.is_playing { "playing".green() } else { "stopped".dimmed() }
        );
        for (index, track) in song.tracks.iter().enumerate() {
            let selected = if song.selected_track == Some(track.id) { ">" } else { " " };
            let arm = if !track.can_be_armed {
                "-".dimmed()
            } else if track.arm {
                "A".red().bold()
            } else if track.implicit_arm {
                "I".yellow()
            } else {
                ".".normal()
            };
            let instrument = self
                .scanner
                .find_instrument(&track.devices)
                .map(|i| i.to_string())
                .unwrap_or_default();
            println!(
                "{} {:>2} {} {:<6} {:<24} {}",
                selected,
                index,
                arm,
                track.id.to_string(),
                track.name,
                instrument.cyan()
            );
        }
    }
}

/// Run the REPL on its own thread; the receiver fires when the user quits
pub fn spawn_repl(context: ReplContext) -> Result<oneshot::Receiver<()>> {
    let (done_tx, done_rx) = oneshot::channel();

    std::thread::Builder::new()
        .name("repl".to_string())
        .spawn(move || {
            let mut editor = match DefaultEditor::new() {
                Ok(editor) => editor,
                Err(e) => {
                    println!("{} failed to start line editor: {}", "error:".red(), e);
                    let _ = done_tx.send(());
                    return;
                }
            };

            println!("{}", "Type 'help' for commands".dimmed());
            loop {
                match editor.readline("kontrol> ") {
                    Ok(line) => {
                        let _ = editor.add_history_entry(line.as_str());
                        match ReplCommand::parse(&line) {
                            Ok(Some(command)) => match context.execute(command) {
                                Ok(true) => {}
                                Ok(false) => break,
                                Err(e) => println!("{} {:#}", "error:".red(), e),
                            },
                            Ok(None) => {}
                            Err(e) => println!("{} {:#}", "error:".red(), e),
                        }
                    }
                    Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => break,
                    Err(e) => {
                        println!("{} {}", "error:".red(), e);
                        break;
                    }
                }
            }
            let _ = done_tx.send(());
        })
        .context("Failed to spawn REPL thread")?;

    Ok(done_rx)
}
