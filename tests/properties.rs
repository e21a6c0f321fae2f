//! Property-based tests for the engine's structural invariants.
//!
//! Covers cursor arithmetic, idempotent connections, parameter clamping and
//! agreement between the control-side bookkeeping and the processing graph,
//! using proptest for randomized inputs.

use proptest::prelude::*;

use modular_engine::config::EngineConfig;
use modular_engine::dsp::{
    ComponentType, ModulatorType, ModuleType, ParameterType, ParameterValue, PortClass, Socket,
};
use modular_engine::engine::{create_engine, Connection, Intent};

fn add(
    controller: &mut modular_engine::engine::Controller,
    component_type: ComponentType,
    id: u64,
) {
    let outcome = controller.apply(Intent::AddComponent {
        component_type,
        name: String::new(),
        id: Some(id),
    });
    assert!(outcome.is_success(), "{outcome:?}");
}

fn midi(from: u64, to: u64) -> (Socket, Socket) {
    (
        Socket::new(from, 0, PortClass::MidiOut),
        Socket::new(to, 0, PortClass::MidiIn),
    )
}

const ENVELOPE: ComponentType = ComponentType::Modulator(ModulatorType::AdsrEnvelope);

#[derive(Clone, Debug)]
enum Op {
    Connect(u64, u64),
    Disconnect(u64, u64),
    Remove(u64),
    Add(u64),
}

fn op() -> impl Strategy<Value = Op> {
    let id = 1u64..6;
    prop_oneof![
        4 => (id.clone(), id.clone()).prop_map(|(a, b)| Op::Connect(a, b)),
        2 => (id.clone(), id.clone()).prop_map(|(a, b)| Op::Disconnect(a, b)),
        1 => id.clone().prop_map(Op::Remove),
        1 => id.prop_map(Op::Add),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// After N ticks every write cursor equals N mod the buffer capacity.
    #[test]
    fn cursor_is_ticks_mod_capacity(buffer_size in 1usize..64, ticks in 0usize..2_000) {
        let mut config = EngineConfig::default();
        config.audio.buffer_size = buffer_size;
        config.oscillator.wavetable_size = 64;
        let (mut controller, mut processor) = create_engine(&config);
        add(&mut controller, ComponentType::Module(ModuleType::Oscillator), 1);
        add(&mut controller, ENVELOPE, 2);

        for _ in 0..ticks {
            processor.tick();
        }
        for id in [1, 2] {
            // the add commands are applied by the first tick
            if let Some(module) = processor.graph().module(id) {
                prop_assert_eq!(module.core().cursor(), ticks % buffer_size);
            } else {
                prop_assert_eq!(ticks, 0);
            }
        }
    }

    /// Repeating a connect never adds a second edge or input.
    #[test]
    fn connect_is_idempotent(repeats in 1usize..6) {
        let (mut controller, mut processor) = create_engine(&EngineConfig::default());
        add(&mut controller, ComponentType::Module(ModuleType::Oscillator), 1);
        add(&mut controller, ComponentType::Module(ModuleType::AudioOutput), 2);

        let outbound = Socket::new(1, 0, PortClass::AudioOut);
        let inbound = Socket::new(2, 0, PortClass::AudioIn);
        let accepted = (0..repeats)
            .filter(|_| controller.apply(Intent::CreateConnection { outbound, inbound }).is_success())
            .count();
        processor.tick();

        prop_assert_eq!(accepted, 1);
        prop_assert_eq!(controller.connections().len(), 1);
        prop_assert_eq!(processor.graph().module(2).unwrap().core().inputs().len(), 1);
    }

    /// Accepted parameter writes always land inside the parameter's limits.
    #[test]
    fn parameters_stay_within_limits(
        frequency in -1.0e6f64..1.0e6,
        amplitude in -10.0f64..10.0,
        release in -10.0f64..10.0,
    ) {
        let (mut controller, _processor) = create_engine(&EngineConfig::default());
        add(&mut controller, ComponentType::Module(ModuleType::Oscillator), 1);
        add(&mut controller, ENVELOPE, 2);

        let writes = [
            (1, ParameterType::Frequency, ParameterValue::Double(frequency)),
            (1, ParameterType::Amplitude, ParameterValue::Double(amplitude)),
            (2, ParameterType::Release, ParameterValue::Double(release)),
        ];
        for (id, parameter, value) in writes {
            let outcome = controller.apply(Intent::SetParameter { id, parameter, value });
            prop_assert!(outcome.is_success());

            let stored = controller
                .components()
                .handle(id)
                .unwrap()
                .parameters
                .get(parameter)
                .unwrap()
                .as_f64();
            let limits = parameter.limits();
            prop_assert!(
                stored >= limits.min - 1e-6 && stored <= limits.max + 1e-6,
                "{} stored {} outside {:?}", parameter, stored, limits
            );
        }
    }

    /// A shuffled chain is processed in chain order, whatever the ids.
    #[test]
    fn chain_is_processed_in_dependency_order(
        ids in Just((1u64..=6).collect::<Vec<_>>()).prop_shuffle(),
    ) {
        let (mut controller, mut processor) = create_engine(&EngineConfig::default());
        for &id in &ids {
            add(&mut controller, ENVELOPE, id);
        }
        for pair in ids.windows(2) {
            let (outbound, inbound) = midi(pair[0], pair[1]);
            let outcome = controller.apply(Intent::CreateConnection { outbound, inbound });
            prop_assert!(outcome.is_success(), "{:?}", outcome);
        }
        // closing the chain would make a cycle
        let (outbound, inbound) = midi(ids[ids.len() - 1], ids[0]);
        let closing = controller.apply(Intent::CreateConnection { outbound, inbound });
        prop_assert!(!closing.is_success());

        processor.tick();
        prop_assert_eq!(processor.graph().processing_order(), ids.as_slice());
    }

    /// Whatever sequence of edits is applied, the processing graph ends up
    /// with exactly the connections the control plane committed.
    #[test]
    fn graph_mirrors_committed_connections(ops in prop::collection::vec(op(), 1..40)) {
        let (mut controller, mut processor) = create_engine(&EngineConfig::default());
        for id in 1..6 {
            add(&mut controller, ENVELOPE, id);
        }

        for op in ops {
            let intent = match op {
                Op::Connect(a, b) => {
                    let (outbound, inbound) = midi(a, b);
                    Intent::CreateConnection { outbound, inbound }
                }
                Op::Disconnect(a, b) => {
                    let (outbound, inbound) = midi(a, b);
                    Intent::RemoveConnection { connection: Connection::new(outbound, inbound) }
                }
                Op::Remove(id) => Intent::RemoveComponent { id },
                Op::Add(id) => Intent::AddComponent {
                    component_type: ENVELOPE,
                    name: String::new(),
                    id: Some(id),
                },
            };
            controller.apply(intent);
        }
        processor.tick();
        controller.poll_events();

        let mut committed = controller.connections().connections().to_vec();
        let mut applied = processor.graph().connections().to_vec();
        committed.sort();
        applied.sort();
        prop_assert_eq!(committed, applied);
        prop_assert_eq!(controller.components().len(), processor.graph().module_count());
    }
}
