//! # Map sender
//!
//! Periodically broadcasts the fly map and the aircraft's position to the operator console.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use std::{sync::Arc, time::Duration};

use crossbeam_channel::{select, tick};
use log::{info, warn};
use serde::Deserialize;

use comms_if::{msg::Message, net::MsgChannel};

use crate::{
    fly_map::FlyMap,
    nav::Nav,
    shutdown::{Shutdown, POLL_PERIOD},
};

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Broadcast periods.
#[derive(Debug, Clone, Deserialize)]
pub struct MapSenderParams {
    /// Period between fly map messages.
    pub map_period_s: f64,

    /// Period between position messages.
    pub pos_period_s: f64,
}

/// Fly map and position broadcaster.
pub struct MapSender {
    console: Arc<dyn MsgChannel>,
    fly_map: Arc<FlyMap>,
    nav: Arc<Nav>,
    params: MapSenderParams,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl Default for MapSenderParams {
    fn default() -> Self {
        Self {
            map_period_s: 1.0,
            pos_period_s: 0.1,
        }
    }
}

impl MapSender {
    pub fn new(
        console: Arc<dyn MsgChannel>,
        fly_map: Arc<FlyMap>,
        nav: Arc<Nav>,
        params: MapSenderParams,
    ) -> Self {
        Self {
            console,
            fly_map,
            nav,
            params,
        }
    }

    /// Send the current fly map.
    pub fn send_map(&self) {
        self.send(Message::fly_map(self.fly_map.serialize()));
    }

    /// Send the current position.
    pub fn send_pos(&self) {
        self.send(Message::pos(self.nav.current_pose().to_obj()));
    }

    /// Broadcast until shutdown is requested.
    pub fn run(&self, shutdown: &Shutdown) {
        info!("Map sender started");

        let map_ticker = tick(Duration::from_secs_f64(self.params.map_period_s));
        let pos_ticker = tick(Duration::from_secs_f64(self.params.pos_period_s));

        while !shutdown.is_requested() {
            select! {
                recv(map_ticker) -> _ => self.send_map(),
                recv(pos_ticker) -> _ => self.send_pos(),
                default(POLL_PERIOD) => (),
            }
        }

        info!("Map sender stopped");
    }

    fn send(&self, msg: Message) {
        if let Err(e) = self.console.send(msg) {
            warn!("Could not send to the console: {}", e);
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use comms_if::{msg::MsgType, net::LocalChannel};
    use std::thread;
    use util::maths::V3D;

    #[test]
    fn test_periodic_broadcast() {
        let (ours, theirs) = LocalChannel::pair();
        let fly_map = Arc::new(FlyMap::new("FlyMap", "map.mtl"));
        fly_map.add_checkpoint(V3D::new(1.0, 2.0, 3.0));

        let sender = MapSender::new(
            Arc::new(ours),
            fly_map,
            Arc::new(Nav::new()),
            MapSenderParams {
                map_period_s: 0.05,
                pos_period_s: 0.01,
            },
        );

        let shutdown = Shutdown::new();
        let jh = {
            let shutdown = shutdown.clone();
            thread::spawn(move || sender.run(&shutdown))
        };

        thread::sleep(Duration::from_millis(300));
        shutdown.request();
        jh.join().unwrap();

        let msgs = theirs.drain();
        let maps: Vec<&Message> = msgs.iter().filter(|m| m.msg_type == MsgType::FlyMap).collect();
        let poss: Vec<&Message> = msgs.iter().filter(|m| m.msg_type == MsgType::Pos).collect();

        assert!(!maps.is_empty());
        assert!(poss.len() > maps.len());
        assert_eq!(
            maps[0].content_str().unwrap(),
            "mtllib map.mtl\no FlyMap\nv 1.000000 2.000000 3.000000\n"
        );
        assert!(poss[0].content_str().unwrap().starts_with("mtllib pos.mtl\no Pos\n"));
    }
}
