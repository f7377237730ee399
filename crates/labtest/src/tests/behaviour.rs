//! Behavioural tests covering the lab lifecycle and address resolution.

#![cfg(unix)]

use std::cell::RefCell;
use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use rstest::fixture;
use rstest_bdd_macros::{given, scenario, then, when};

use crate::error::LabError;
use crate::lab::{Lab, LabState};
use crate::tests::support::{DETACHING, EXITING, INSPECTION, shell};
use crate::tool::Inspector;
use crate::{AddressingMode, LaunchSpec};

const EXIT_TIMEOUT: Duration = Duration::from_secs(5);

type StepResult = Result<(), String>;

/// Inspector returning canned output and counting invocations.
#[derive(Debug, Default)]
struct CountingInspector {
    calls: AtomicUsize,
}

impl Inspector for CountingInspector {
    fn inspect(&self, _identifier: &str) -> Result<Vec<u8>, LabError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(INSPECTION.to_vec())
    }
}

#[derive(Default)]
struct LabWorld {
    lab: Option<Lab>,
    inspector: Arc<CountingInspector>,
    id_file: Option<PathBuf>,
    started: Option<Result<(), LabError>>,
}

impl LabWorld {
    fn create(&mut self, launcher: impl FnOnce(&Path) -> LaunchSpec, mode: AddressingMode) {
        let inspector: Arc<dyn Inspector> = Arc::clone(&self.inspector) as Arc<dyn Inspector>;
        let lab = Lab::new(launcher, inspector, mode).expect("allocate lab id file");
        self.id_file = Some(lab.id_file().to_path_buf());
        self.lab = Some(lab);
    }

    fn lab(&self) -> Result<&Lab, String> {
        self.lab.as_ref().ok_or_else(|| String::from("no lab was created"))
    }

    fn id_file(&self) -> Result<&PathBuf, String> {
        self.id_file
            .as_ref()
            .ok_or_else(|| String::from("no id file was allocated"))
    }
}

#[fixture]
fn world() -> RefCell<LabWorld> {
    RefCell::new(LabWorld::default())
}

// ---------------------------------------------------------------------------
// Given steps
// ---------------------------------------------------------------------------

#[given("a lab that prints a line and detaches")]
fn given_detaching_lab(world: &RefCell<LabWorld>) {
    world
        .borrow_mut()
        .create(shell(DETACHING), AddressingMode::Routed);
}

#[given("a lab that exits immediately")]
fn given_exiting_lab(world: &RefCell<LabWorld>) {
    world
        .borrow_mut()
        .create(shell(EXITING), AddressingMode::Routed);
}

#[given("a detached lab in {mode} mode")]
fn given_lab_in_mode(world: &RefCell<LabWorld>, mode: String) -> StepResult {
    let addressing = match mode.as_str() {
        "routed" => AddressingMode::Routed,
        "forwarded" => AddressingMode::Forwarded,
        other => return Err(format!("unknown addressing mode {other}")),
    };
    world.borrow_mut().create(shell(DETACHING), addressing);
    Ok(())
}

// ---------------------------------------------------------------------------
// When steps
// ---------------------------------------------------------------------------

#[when("the lab is started")]
fn when_started(world: &RefCell<LabWorld>) -> StepResult {
    let outcome = world.borrow().lab()?.start();
    world.borrow_mut().started = Some(outcome);
    Ok(())
}

#[when("the lab is closed twice")]
fn when_closed_twice(world: &RefCell<LabWorld>) -> StepResult {
    let state = world.borrow();
    let lab = state.lab()?;
    lab.close();
    lab.close();
    Ok(())
}

// ---------------------------------------------------------------------------
// Then steps
// ---------------------------------------------------------------------------

#[then("the lab is running")]
fn then_running(world: &RefCell<LabWorld>) -> StepResult {
    let state = world.borrow();
    match &state.started {
        Some(Ok(())) => {}
        Some(Err(error)) => return Err(format!("start failed: {error}")),
        None => return Err(String::from("lab was not started")),
    }
    let lab = state.lab()?;
    if lab.state() != LabState::Running {
        return Err(format!("expected running lab, found {:?}", lab.state()));
    }
    if lab.is_closed() {
        return Err(String::from("running lab reports an exit"));
    }
    Ok(())
}

#[then("the identifier matches the id file")]
fn then_identifier_matches(world: &RefCell<LabWorld>) -> StepResult {
    let state = world.borrow();
    let contents = fs::read_to_string(state.id_file()?).map_err(|error| error.to_string())?;
    let identifier = state.lab()?.identifier();
    if identifier != Some(contents.trim()) {
        return Err(format!(
            "identifier {identifier:?} differs from file contents {contents:?}"
        ));
    }
    Ok(())
}

#[then("starting fails because the lab exited")]
fn then_premature_exit(world: &RefCell<LabWorld>) -> StepResult {
    match &world.borrow().started {
        Some(Err(LabError::PrematureExit { .. })) => Ok(()),
        Some(Err(other)) => Err(format!("unexpected error: {other}")),
        Some(Ok(())) => Err(String::from("exiting lab started")),
        None => Err(String::from("lab was not started")),
    }
}

#[then("the lab has ended")]
fn then_ended(world: &RefCell<LabWorld>) -> StepResult {
    let state = world.borrow();
    let lab = state.lab()?;
    lab.wait_timeout(EXIT_TIMEOUT)
        .ok_or_else(|| String::from("lab did not end"))?;
    if lab.state() != LabState::Closed {
        return Err(format!("expected closed lab, found {:?}", lab.state()));
    }
    Ok(())
}

#[then("the id file is gone")]
fn then_id_file_gone(world: &RefCell<LabWorld>) -> StepResult {
    let state = world.borrow();
    let id_file = state.id_file()?;
    if id_file.exists() {
        return Err(format!("{} still exists", id_file.display()));
    }
    Ok(())
}

#[then("port {port} is reached at {endpoint}")]
fn then_reached_at(world: &RefCell<LabWorld>, port: u16, endpoint: SocketAddr) -> StepResult {
    let resolved = world
        .borrow()
        .lab()?
        .access_point(port)
        .map_err(|error| error.to_string())?;
    if resolved != endpoint {
        return Err(format!("expected {endpoint}, resolved {resolved}"));
    }
    Ok(())
}

#[then("port {port} has no route")]
fn then_no_route(world: &RefCell<LabWorld>, port: u16) -> StepResult {
    match world.borrow().lab()?.access_point(port) {
        Err(LabError::RouteNotFound { port: missing }) if missing == port => Ok(()),
        Err(other) => Err(format!("unexpected error: {other}")),
        Ok(endpoint) => Err(format!("unexpected route to {endpoint}")),
    }
}

#[then("the lab was inspected once")]
fn then_inspected_once(world: &RefCell<LabWorld>) -> StepResult {
    let calls = world.borrow().inspector.calls.load(Ordering::SeqCst);
    if calls != 1 {
        return Err(format!("expected one inspection, saw {calls}"));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Scenario registration
// ---------------------------------------------------------------------------

#[scenario(
    path = "tests/features/lab_lifecycle.feature",
    name = "A detaching lab runs until it is closed"
)]
fn detaching_lab(world: RefCell<LabWorld>) {
    drop(world);
}

#[scenario(
    path = "tests/features/lab_lifecycle.feature",
    name = "A lab that exits during startup fails to start"
)]
fn exiting_lab(world: RefCell<LabWorld>) {
    drop(world);
}

#[scenario(
    path = "tests/features/lab_lifecycle.feature",
    name = "A routed lab is reached on its own address"
)]
fn routed_lab(world: RefCell<LabWorld>) {
    drop(world);
}

#[scenario(
    path = "tests/features/lab_lifecycle.feature",
    name = "A forwarded lab is reached through the loopback address"
)]
fn forwarded_lab(world: RefCell<LabWorld>) {
    drop(world);
}
