//! # Command processor module
//!
//! The command processor handles operator commands coming from any source (console or script),
//! translating them into aircraft manoeuvres, fly map updates and autopilot chains. Every command
//! is answered with a status line on the console.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use log::{debug, error, info, warn};
use std::{sync::Arc, thread, time::Duration};

// Internal
use comms_if::{
    cmd::{Cmd, MoveKey},
    eqpt::flight::{FlightData, MnvrCmd},
    msg::{Message, MsgType},
    net::{MsgChannel, NetError},
};
use util::{
    maths::V3D,
    script_interpreter::{PendingCmds, ScriptInterpreter},
};

use crate::{
    autopilot::{Autopilot, Home},
    fly_map::{CheckpointId, FlyMap},
    flight_client::Flight,
    nav::Nav,
    shutdown::Shutdown,
};

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Executes operator commands.
pub struct CmdProcessor {
    flight: Arc<dyn Flight>,
    fly_map: Arc<FlyMap>,
    nav: Arc<Nav>,
    autopilot: Autopilot,
    console: Arc<dyn MsgChannel>,

    /// Speed of manual manoeuvres in percent.
    mnvr_speed_pct: u8,

    home: Home,

    /// The most recently marked checkpoint, which the next mark is linked to.
    last_checkpoint: Option<CheckpointId>,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl CmdProcessor {
    pub fn new(
        flight: Arc<dyn Flight>,
        fly_map: Arc<FlyMap>,
        nav: Arc<Nav>,
        autopilot: Autopilot,
        console: Arc<dyn MsgChannel>,
        mnvr_speed_pct: u8,
    ) -> Self {
        Self {
            flight,
            fly_map,
            nav,
            autopilot,
            console,
            mnvr_speed_pct,
            home: Home::default(),
            last_checkpoint: None,
        }
    }

    /// The current home pose.
    pub fn home(&self) -> Home {
        self.home
    }

    /// Execute commands from the console until shutdown is requested or the console disconnects.
    ///
    /// Waits at most `poll_period` for each message.
    pub fn run_console(
        &mut self,
        poll_period: Duration,
        shutdown: &Shutdown,
    ) -> Result<(), NetError> {
        while !shutdown.is_requested() {
            match self.console.recv_timeout(poll_period) {
                Ok(Some(msg)) => self.exec_msg(&msg),
                Ok(None) => (),
                Err(NetError::Disconnected) => {
                    info!("Console disconnected, stopping");
                    return Ok(());
                }
                Err(e) => return Err(e),
            }
        }

        info!("Shutdown requested, stopping");
        Ok(())
    }

    /// Execute the script's commands as they fall due, until shutdown is requested or the script
    /// ends.
    pub fn run_script(
        &mut self,
        si: &mut ScriptInterpreter,
        poll_period: Duration,
        shutdown: &Shutdown,
    ) {
        while !shutdown.is_requested() {
            match si.get_pending_cmds() {
                PendingCmds::None => (),
                PendingCmds::Some(cmds) => {
                    for cmd in cmds {
                        self.exec(cmd);
                    }
                }
                PendingCmds::EndOfScript => {
                    info!("End of command script reached, stopping");
                    return;
                }
            }

            thread::sleep(poll_period);
        }

        info!("Shutdown requested, stopping");
    }

    /// Execute a console message. Messages which aren't commands are ignored.
    pub fn exec_msg(&mut self, msg: &Message) {
        if msg.msg_type != MsgType::Cmd {
            debug!("Ignoring {:?} message from the console", msg.msg_type);
            return;
        }

        match msg.content_str() {
            Ok(token) => {
                self.exec_token(token);
            }
            Err(e) => warn!("Could not read command: {}", e),
        }
    }

    /// Execute a command token, returning the status line sent to the operator.
    ///
    /// Unrecognised tokens are not executed, but are still answered with a status line.
    pub fn exec_token(&mut self, token: &str) -> String {
        match Cmd::from_token(token) {
            Ok(cmd) => self.exec(cmd),
            Err(e) => {
                warn!("Could not parse command: {}", e);
                self.report(token.trim())
            }
        }
    }

    /// Execute a command, returning the status line sent to the operator.
    pub fn exec(&mut self, cmd: Cmd) -> String {
        debug!("Recieved {:?} command", cmd);

        match cmd {
            Cmd::Press(k) => self.mnvr(mnvr_for_key(k, self.mnvr_speed_pct)),
            Cmd::Release(_) => self.mnvr(MnvrCmd::Hover),
            Cmd::TakeOff => self.mnvr(MnvrCmd::TakeOff),
            Cmd::Land => self.mnvr(MnvrCmd::Land),
            Cmd::SetHome => {
                if let Err(e) = self.flight.set_home() {
                    error!("Could not set the aircraft's home: {}", e);
                }

                let pos = self.nav.current_pose();
                self.home = Home {
                    location: pos.location,
                    yaw_deg: pos.yaw_deg(),
                };
                info!(
                    "Home set to {:?}, yaw {} deg",
                    self.home.location, self.home.yaw_deg
                );
            }
            Cmd::ReturnHome => self.fly_to(self.home.location),
            Cmd::MarkCheckpoint => {
                let location = self.nav.current_pose().location;
                let id = self.fly_map.add_checkpoint(location);

                if let Some(last) = self.last_checkpoint {
                    // Failures are logged by the map
                    self.fly_map.link_checkpoint(last, id).ok();
                }
                self.last_checkpoint = Some(id);

                info!("Checkpoint {} marked at {:?}", id, location);
            }
            Cmd::RecallCheckpoint(id) => match self.fly_map.get_checkpoint(id) {
                Ok(target) => self.fly_to(target),
                Err(e) => warn!("Cannot fly to checkpoint: {}", e),
            },
        }

        self.report(&cmd.info())
    }

    fn mnvr(&self, cmd: MnvrCmd) {
        if let Err(e) = self.flight.mnvr(cmd) {
            warn!("Could not perform {:?}: {}", cmd, e);
        }
    }

    fn fly_to(&self, target: V3D) {
        // Failures are logged by the autopilot, and the chain runs detached
        self.autopilot.fly_to(target, self.home).ok();
    }

    /// Build the status line for the command and send it to the operator.
    fn report(&self, info: &str) -> String {
        let status = status_line(info, &self.flight.flight_data());

        if let Err(e) = self.console.send(Message::log(status.as_str())) {
            warn!("Could not send command status to the console: {}", e);
        }

        status
    }
}

// ---------------------------------------------------------------------------
// PRIVATE FUNCTIONS
// ---------------------------------------------------------------------------

fn mnvr_for_key(key: MoveKey, speed_pct: u8) -> MnvrCmd {
    match key {
        MoveKey::TurnLeft => MnvrCmd::TurnLeft(speed_pct),
        MoveKey::TurnRight => MnvrCmd::TurnRight(speed_pct),
        MoveKey::Forward => MnvrCmd::Forward(speed_pct),
        MoveKey::Backward => MnvrCmd::Backward(speed_pct),
        MoveKey::Left => MnvrCmd::Left(speed_pct),
        MoveKey::Right => MnvrCmd::Right(speed_pct),
        MoveKey::Up => MnvrCmd::Up(speed_pct),
        MoveKey::Down => MnvrCmd::Down(speed_pct),
    }
}

fn status_line(info: &str, fd: &FlightData) -> String {
    let mut status = format!(
        "Command {} BatPrc: {}; LgtStr: {}",
        info, fd.battery_pct, fd.light_strength
    );

    if fd.battery_low {
        status.push_str(" BatteryLow");
    }
    if fd.battery_critical {
        status.push_str(" BatteryCritical");
    }
    if fd.down_visual_state {
        status.push_str(" DownVisualState");
    }
    if fd.error_state {
        status.push_str(" ErrorState");
    }

    status
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{
        autopilot::{AutopilotParams, AutopilotState},
        flight_client::mock::{FlightCall, MockFlight},
    };
    use comms_if::net::LocalChannel;

    struct Fixture {
        flight: Arc<MockFlight>,
        fly_map: Arc<FlyMap>,
        nav: Arc<Nav>,
        console: LocalChannel,
        proc: CmdProcessor,
    }

    fn fixture() -> Fixture {
        let flight = Arc::new(MockFlight::default());
        let fly_map = Arc::new(FlyMap::new("FlyMap", "map.mtl"));
        let nav = Arc::new(Nav::new());
        let (ours, theirs) = LocalChannel::pair();
        let ours: Arc<dyn MsgChannel> = Arc::new(ours);

        let autopilot = Autopilot::new(flight.clone(), ours.clone(), AutopilotParams::default());
        let proc = CmdProcessor::new(
            flight.clone(),
            fly_map.clone(),
            nav.clone(),
            autopilot,
            ours,
            100,
        );

        Fixture {
            flight,
            fly_map,
            nav,
            console: theirs,
            proc,
        }
    }

    fn sample(x: f32, y: f32, z: f32, yaw_deg: i16) -> FlightData {
        FlightData {
            position_x: x,
            position_y: y,
            position_z: z,
            yaw_deg,
            ..Default::default()
        }
    }

    #[test]
    fn test_manual_mnvrs() {
        let mut f = fixture();

        f.proc.exec_token("Du");
        f.proc.exec_token("Dw");
        f.proc.exec_token("Uw");
        f.proc.exec_token("De");
        f.proc.exec_token("Dl");

        assert_eq!(
            f.flight.calls(),
            vec![
                FlightCall::Mnvr(MnvrCmd::TakeOff),
                FlightCall::Mnvr(MnvrCmd::Forward(100)),
                FlightCall::Mnvr(MnvrCmd::Hover),
                FlightCall::Mnvr(MnvrCmd::TurnRight(100)),
                FlightCall::Mnvr(MnvrCmd::Land),
            ]
        );
    }

    #[test]
    fn test_status_line() {
        let mut f = fixture();

        assert_eq!(
            f.proc.exec_token("Dw"),
            "Command Started Going Forward BatPrc: 0; LgtStr: 0"
        );

        *f.flight.flight_data.lock() = FlightData {
            battery_pct: 12,
            light_strength: 1,
            battery_low: true,
            error_state: true,
            ..Default::default()
        };
        assert_eq!(
            f.proc.exec_token("Ud"),
            "Command Stopped Going Right BatPrc: 12; LgtStr: 1 BatteryLow ErrorState"
        );

        let sent: Vec<Message> = f.console.drain();
        assert_eq!(sent.len(), 2);
        assert!(sent.iter().all(|m| m.msg_type == MsgType::Log));
    }

    #[test]
    fn test_unknown_token() {
        let mut f = fixture();

        assert_eq!(f.proc.exec_token("Zz"), "Command Zz BatPrc: 0; LgtStr: 0");
        assert!(f.flight.calls().is_empty());
    }

    #[test]
    fn test_mark_checkpoints() {
        let mut f = fixture();

        f.nav.on_sample(&sample(0.0, 0.0, 0.0, 0));
        f.proc.exec(Cmd::MarkCheckpoint);
        f.nav.on_sample(&sample(1.0, 0.0, -2.0, 0));
        f.proc.exec(Cmd::MarkCheckpoint);
        f.nav.on_sample(&sample(1.0, 1.0, -2.0, 0));
        f.proc.exec(Cmd::MarkCheckpoint);

        assert_eq!(f.fly_map.len(), 3);
        assert_eq!(f.fly_map.get_checkpoint(2).unwrap(), V3D::new(1.0, 0.0, 2.0));
        assert_eq!(f.fly_map.neighbours(1).unwrap(), vec![2]);
        assert_eq!(f.fly_map.neighbours(2).unwrap(), vec![1, 3]);
        assert_eq!(f.fly_map.neighbours(3).unwrap(), vec![2]);
    }

    #[test]
    fn test_set_home_and_recall() {
        let mut f = fixture();

        f.nav.on_sample(&sample(5.0, 3.0, 2.0, 90));
        f.proc.exec(Cmd::SetHome);

        assert_eq!(
            f.proc.home(),
            Home {
                location: V3D::new(5.0, 3.0, -2.0),
                yaw_deg: 90
            }
        );
        assert_eq!(f.flight.calls(), vec![FlightCall::SetHome]);

        f.nav.on_sample(&sample(25.0, -7.0, -40.0, 0));
        f.proc.exec(Cmd::MarkCheckpoint);

        // Unknown checkpoints don't start a chain
        f.proc.exec(Cmd::RecallCheckpoint(2));
        assert_eq!(f.flight.calls().len(), 1);

        f.proc.exec(Cmd::RecallCheckpoint(1));
        assert_eq!(f.flight.calls()[1], FlightCall::FlyToXy(20.0, -10.0));

        // Finish the chain
        for issued in 2..=4 {
            let mut tries = 0;
            while f.flight.calls().len() < issued && tries < 200 {
                thread::sleep(Duration::from_millis(10));
                tries += 1;
            }
            assert!(f.flight.complete_next());
        }
        assert_eq!(f.flight.calls()[2], FlightCall::TurnToYaw(90));
        assert_eq!(f.flight.calls()[3], FlightCall::FlyToHeight(4));

        let mut tries = 0;
        while f.proc.autopilot.state() != AutopilotState::Done && tries < 200 {
            thread::sleep(Duration::from_millis(10));
            tries += 1;
        }
        assert_eq!(f.proc.autopilot.state(), AutopilotState::Done);
    }

    #[test]
    fn test_run_console_stops_on_shutdown() {
        let Fixture {
            flight,
            console,
            mut proc,
            ..
        } = fixture();
        let shutdown = Shutdown::new();

        let jh = {
            let shutdown = shutdown.clone();
            thread::spawn(move || {
                let res = proc.run_console(Duration::from_millis(10), &shutdown);
                (res, proc)
            })
        };

        console.send(Message::cmd("Du")).unwrap();

        let mut tries = 0;
        while flight.calls().is_empty() && tries < 200 {
            thread::sleep(Duration::from_millis(10));
            tries += 1;
        }
        assert_eq!(flight.calls(), vec![FlightCall::Mnvr(MnvrCmd::TakeOff)]);

        // The console is still connected, only the shutdown request ends the loop
        shutdown.request();
        let (res, _proc) = jh.join().unwrap();
        assert!(res.is_ok());
    }

    #[test]
    fn test_run_script_stops_on_shutdown() {
        let mut f = fixture();
        let shutdown = Shutdown::new();

        // Never falls due within the test
        let mut si = ScriptInterpreter::from_script("100000.0: Du;\n").unwrap();

        let requester = {
            let shutdown = shutdown.clone();
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(50));
                shutdown.request();
            })
        };

        f.proc.run_script(&mut si, Duration::from_millis(5), &shutdown);
        requester.join().unwrap();

        assert!(f.flight.calls().is_empty());
    }

    #[test]
    fn test_exec_msg_ignores_other_types() {
        let mut f = fixture();

        f.proc.exec_msg(&Message::log("Du"));
        assert!(f.flight.calls().is_empty());

        f.proc.exec_msg(&Message::cmd("Du"));
        assert_eq!(f.flight.calls(), vec![FlightCall::Mnvr(MnvrCmd::TakeOff)]);
    }
}
