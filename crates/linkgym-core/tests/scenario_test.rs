//! Integration tests driving the selector and the measurement loop together
//! on the cooperative scheduler, with an agent thread behind the channel
//! transport.

use linkgym_core::gym::{
    Action, ActionValue, AgentEndpoint, ChannelTransport, EnvConfig, Measurement, StepLoop,
    StepLoopState, StepOutcome,
};
use linkgym_core::ratectl::{
    DeviceCaps, LinkId, ModeDescriptor, ModeSelector, ModulationClass, OverrideScope, PeerCaps,
    SelectorConfig, ShannonQualityModel,
};
use linkgym_core::sim::Scheduler;
use std::thread::JoinHandle;

const LINK: LinkId = LinkId(0);

struct Ctx {
    selector: ModeSelector<ShannonQualityModel>,
    gym: StepLoop<ChannelTransport>,
    emitted_at: Vec<u64>,
    applied: u32,
}

fn step(ctx: &mut Ctx, sched: &mut Scheduler<Ctx>) {
    let now = sched.now_ms();
    let Ctx { gym, selector, emitted_at, applied } = ctx;

    let outcome = gym
        .fire(
            now,
            |t| {
                emitted_at.push(t);
                let mut m = Measurement::new("TsRateControl", LINK.0, t);
                m.append("meas::succ", 16.0).append("meas::fail", 0.0);
                vec![m]
            },
            |action| {
                let index = action.value.map(|v| v.as_i64()).unwrap_or(0);
                selector.apply_override(OverrideScope::Link(LINK), index as u8).unwrap();
                *applied += 1;
            },
        )
        .unwrap();

    if matches!(outcome, StepOutcome::Stepped { .. }) {
        if let Some(at) = ctx.gym.next_event_ms() {
            sched.schedule_at(at, step);
        }
    }
}

fn make_ctx(env: EnvConfig, transport: ChannelTransport) -> Ctx {
    let mut selector = ModeSelector::new(
        DeviceCaps::default(),
        ShannonQualityModel,
        SelectorConfig::default(),
    )
    .unwrap();
    selector.register_link(LINK, PeerCaps::default());
    Ctx { selector, gym: StepLoop::new(env, transport), emitted_at: Vec::new(), applied: 0 }
}

fn run(env: EnvConfig, transport: ChannelTransport) -> Ctx {
    let end = env.env_end_time_ms;
    let mut ctx = make_ctx(env, transport);
    let mut sched = Scheduler::new();
    if let Some(at) = ctx.gym.next_event_ms() {
        sched.schedule_at(at, step);
    }
    sched.run_until(&mut ctx, end);
    ctx
}

/// Agent replying to every batch with the given action
fn spawn_agent(endpoint: AgentEndpoint, reply: Action) -> JoinHandle<()> {
    std::thread::spawn(move || {
        while endpoint.measurements.recv().is_ok() {
            if endpoint.actions.send(reply.clone()).is_err() {
                break;
            }
        }
    })
}

#[test]
fn test_emission_cadence_under_scheduler() {
    let env = EnvConfig {
        measurement_start_time_ms: 1_000,
        measurement_interval_ms: 200,
        max_wait_time_for_action_ms: 50,
        env_end_time_ms: 5_000,
    };
    let (transport, endpoint) = ChannelTransport::pair();
    let agent = spawn_agent(endpoint, Action::none("TsRateControl", LINK.0));

    let ctx = run(env, transport);
    let expected: Vec<u64> = (1_000..5_000).step_by(200).collect();
    assert_eq!(ctx.emitted_at, expected);
    assert_eq!(ctx.gym.steps_emitted(), 20);
    assert_eq!(ctx.gym.state(), StepLoopState::Stopped);
    assert_eq!(ctx.applied, 0, "none-valued actions must not be applied");

    drop(ctx);
    agent.join().unwrap();
}

#[test]
fn test_agent_override_reaches_selector() {
    let env = EnvConfig {
        measurement_start_time_ms: 1_000,
        measurement_interval_ms: 500,
        max_wait_time_for_action_ms: 200,
        env_end_time_ms: 3_000,
    };
    let (transport, endpoint) = ChannelTransport::pair();
    let agent = spawn_agent(endpoint, Action::new("TsRateControl", LINK.0, ActionValue::Int(9)));

    let mut ctx = run(env, transport);
    assert_eq!(ctx.gym.steps_emitted(), 4);
    assert_eq!(ctx.applied, 4, "every step's action arrives within the window");

    // The override bypasses the search, whatever the link quality says.
    ctx.selector.report_data_ok(LINK, 3.0, 20, 1);
    let tx = ctx.selector.select_data_mode(LINK, 20, 3_000).unwrap();
    assert_eq!(tx.mode, ModeDescriptor::new(ModulationClass::He, 9));
    let ctl = ctx.selector.select_control_mode(LINK).unwrap();
    assert_eq!(ctl.mode.data_rate(20, 800, 1), 54_000_000);

    drop(ctx);
    agent.join().unwrap();
}
