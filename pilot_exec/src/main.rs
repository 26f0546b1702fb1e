//! Main pilot executable entry point.
//!
//! # Architecture
//!
//! The general execution methodology consists of:
//!
//!     - Initialise the session, logging and parameters
//!     - Load or create the fly map
//!     - Start the background threads:
//!         - Simulated aircraft, publishing telemetry
//!         - Navigation, tracking the position from the telemetry
//!         - Map sender, broadcasting the fly map and position to the console
//!     - Main loop:
//!         - Acquire commands from the console or from a script
//!         - Execute them with the command processor
//!     - Stop the background threads and save the fly map, also on Ctrl-C or SIGTERM
//!
//! With no arguments commands are read from the console on stdin. With a single argument it is
//! used as the path to a command script.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use color_eyre::{
    eyre::{eyre, WrapErr},
    Report,
};
use log::{debug, info, warn};
use std::{
    env,
    path::Path,
    sync::Arc,
    thread,
    time::Duration,
};

// Internal
use comms_if::net::{MsgChannel, StdioChannel};
use pilot_lib::{
    autopilot::Autopilot,
    cmd_processor::CmdProcessor,
    fly_map::FlyMap,
    map_sender::MapSender,
    nav::Nav,
    params::PilotExecParams,
    shutdown::Shutdown,
    sim_client::SimClient,
};
use util::{
    logger::{logger_init, LevelFilter},
    script_interpreter::ScriptInterpreter,
    session::Session,
};

// ---------------------------------------------------------------------------
// ENUMS
// ---------------------------------------------------------------------------

/// Where commands are acquired from.
enum CmdSource {
    Console,
    Script(ScriptInterpreter),
}

// ---------------------------------------------------------------------------
// FUNCTIONS
// ---------------------------------------------------------------------------

/// Executable main function, entry point.
fn main() -> Result<(), Report> {
    color_eyre::install()?;

    // ---- EARLY INITIALISATION ----

    // Initialise session
    let session = Session::new("pilot_exec", "sessions").wrap_err("Failed to create the session")?;

    // Initialise logger
    logger_init(LevelFilter::Debug, &session).wrap_err("Failed to initialise logging")?;

    // Log information on this execution.
    info!("Pilot Executable\n");
    info!("Session directory: {:?}\n", session.session_root);

    // ---- LOAD PARAMETERS ----

    let params: PilotExecParams =
        util::params::load("pilot_exec.toml").wrap_err("Could not load pilot_exec params")?;

    info!("Exec parameters loaded");

    // ---- INITIALISE COMMAND SOURCE ----

    let args: Vec<String> = env::args().collect();

    debug!("CLI arguments: {:?}", args);

    let mut cmd_source = match args.len() {
        1 => {
            info!("No script provided, commands will be read from the console\n");
            CmdSource::Console
        }
        2 => {
            info!("Loading script from \"{}\"", &args[1]);

            let si = ScriptInterpreter::new(&args[1]).wrap_err("Failed to load script")?;

            info!(
                "Loaded script lasts {:.02} s and contains {} commands\n",
                si.get_duration(),
                si.get_num_cmds()
            );

            CmdSource::Script(si)
        }
        n => {
            return Err(eyre!(
                "Expected either zero or one argument, found {}",
                n - 1
            ))
        }
    };

    // ---- INITIALISE MODULES ----

    info!("Initialising modules...");

    let fly_map = Arc::new(load_fly_map(&params)?);
    info!("FlyMap \"{}\" contains {} checkpoints", fly_map.name(), fly_map.len());

    let console: Arc<dyn MsgChannel> = Arc::new(StdioChannel::start());
    info!("Console initialised");

    let shutdown = Shutdown::new();
    {
        let shutdown = shutdown.clone();
        ctrlc::set_handler(move || shutdown.request())
            .wrap_err("Failed to install the interrupt handler")?;
    }

    let (sim, telemetry, sim_jh) = SimClient::start(params.sim.clone(), shutdown.clone());
    info!("SimClient initialised");

    let nav = Arc::new(Nav::new());
    let nav_jh = {
        let nav = nav.clone();
        let shutdown = shutdown.clone();
        thread::spawn(move || nav.run(telemetry, &shutdown))
    };
    info!("Nav initialised");

    let map_sender = MapSender::new(
        console.clone(),
        fly_map.clone(),
        nav.clone(),
        params.map_sender.clone(),
    );
    let map_sender_jh = {
        let shutdown = shutdown.clone();
        thread::spawn(move || map_sender.run(&shutdown))
    };
    info!("MapSender initialised");

    let autopilot = Autopilot::new(sim.clone(), console.clone(), params.autopilot.clone());

    let mut cmd_processor = CmdProcessor::new(
        sim,
        fly_map.clone(),
        nav,
        autopilot,
        console.clone(),
        params.mnvr_speed_pct,
    );

    info!("Module initialisation complete\n");

    // ---- MAIN LOOP ----

    info!("Begining main loop\n");

    let poll_period = Duration::from_secs_f64(params.cmd_poll_period_s);

    match cmd_source {
        CmdSource::Console => cmd_processor
            .run_console(poll_period, &shutdown)
            .wrap_err("An error occured while receiving console messages")?,
        CmdSource::Script(ref mut si) => cmd_processor.run_script(si, poll_period, &shutdown),
    }

    // ---- SHUTDOWN ----

    info!("Stopping background threads");
    shutdown.request();

    for (name, jh) in [("SimClient", sim_jh), ("Nav", nav_jh), ("MapSender", map_sender_jh)] {
        if jh.join().is_err() {
            warn!("{} thread panicked", name);
        }
    }

    fly_map
        .save(&params.map_path)
        .wrap_err_with(|| format!("Could not save the FlyMap to {}", params.map_path))?;
    info!("FlyMap saved to {}", params.map_path);

    info!("End of execution");

    Ok(())
}

/// Load the fly map from the configured path, or create an empty one.
fn load_fly_map(params: &PilotExecParams) -> Result<FlyMap, Report> {
    if params.load_map_on_start && Path::new(&params.map_path).exists() {
        info!("Loading FlyMap from {}", params.map_path);
        FlyMap::load(&params.map_path)
            .wrap_err_with(|| format!("Could not load the FlyMap from {}", params.map_path))
    } else {
        info!("Creating new FlyMap \"{}\"", params.map_name);
        Ok(FlyMap::new(&params.map_name, &params.map_mtl_lib))
    }
}
