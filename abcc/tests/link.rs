use abcc::core::{Command, ObjectNumber};
use abcc::error::{DynamicErrorLog, ErrorLog};
use abcc::link::{Link, WriteError};
use abcc::message::{Header, Message};
use abcc::pool::{MessageBuffer, MessagePool};
use abcc::transport::{Transport, WriteStatus};
use abcc_driver::testing::MockTransport;
use core::cell::{Cell, RefCell};
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use proptest::prelude::*;
use std::boxed::Box;
use std::collections::VecDeque;

const CMDS: usize = 3;
const RESPS: usize = 2;
const POOL_SIZE: usize = 16;
const MAX_IN_FLIGHT: usize = 4;

type Pool = MessagePool<CriticalSectionRawMutex, POOL_SIZE>;
type Errors = ErrorLog<CriticalSectionRawMutex, 8>;
type TestLink = Link<'static, CriticalSectionRawMutex, GapTransport, CMDS, RESPS, 4>;

#[derive(Debug, Clone, Copy)]
enum Action {
    WriteCommand,
    WriteResponse,
    CheckSend,
    ReceiveResponse,
}

#[derive(Debug, Clone)]
enum Op {
    Run(Action),
    SetReady { command: bool, write: bool },
    SetSynchronous(bool),
    CompleteWrite,
    /// Runs the action between the next prepare and write of the transport
    Interrupt(Action),
}

fn action_strategy() -> impl Strategy<Value = Action> {
    prop_oneof![
        Just(Action::WriteCommand),
        Just(Action::WriteResponse),
        Just(Action::CheckSend),
        Just(Action::ReceiveResponse),
    ]
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        4 => action_strategy().prop_map(Op::Run),
        2 => (any::<bool>(), any::<bool>())
            .prop_map(|(command, write)| Op::SetReady { command, write }),
        1 => any::<bool>().prop_map(Op::SetSynchronous),
        2 => Just(Op::CompleteWrite),
        2 => action_strategy().prop_map(Op::Interrupt),
    ]
}

/// Messages the link accepted and has not written yet, per class, in acceptance order
#[derive(Default)]
struct Model {
    commands: VecDeque<u8>,
    responses: VecDeque<u8>,
    accepted: usize,
    settled: usize,
    next_id: u8,
}

/// Mock transport that can run a link operation inside the prepare/write gap
struct GapTransport {
    inner: MockTransport<'static>,
    pool: &'static Pool,
    link: Cell<Option<&'static TestLink>>,
    armed: Cell<Option<Action>>,
    open: Cell<bool>,
    model: RefCell<Model>,
}

impl GapTransport {
    fn new(pool: &'static Pool) -> Self {
        Self {
            inner: MockTransport::new(256),
            pool,
            link: Cell::new(None),
            armed: Cell::new(None),
            open: Cell::new(false),
            model: RefCell::new(Model::default()),
        }
    }

    fn accept(&self, command: bool) -> u8 {
        let mut model = self.model.borrow_mut();
        model.next_id = model.next_id.wrapping_add(1);
        let id = model.next_id;
        if command {
            model.commands.push_back(id);
            model.accepted += 1;
        } else {
            model.responses.push_back(id);
        }
        id
    }

    fn withdraw(&self, command: bool) {
        let mut model = self.model.borrow_mut();
        if command {
            model.commands.pop_back();
            model.accepted -= 1;
        } else {
            model.responses.pop_back();
        }
    }

    fn has_room(&self) -> bool {
        self.inner.in_flight() < MAX_IN_FLIGHT
    }
}

impl Transport<'static> for GapTransport {
    fn max_message_size(&self) -> usize {
        self.inner.max_message_size()
    }

    fn is_ready_for_command(&self) -> bool {
        self.inner.is_ready_for_command() && self.has_room()
    }

    fn is_ready_for_write(&self) -> bool {
        self.inner.is_ready_for_write() && self.has_room()
    }

    fn prepare_write(&self, msg: &Message) {
        assert!(!self.open.replace(true), "second prepare before write");
        self.inner.prepare_write(msg);
        if let Some(action) = self.armed.take() {
            let link = self.link.get().unwrap();
            assert!(link.is_write_in_progress());
            perform(link, action);
        }
    }

    fn write_message(&self, msg: MessageBuffer<'static>) -> WriteStatus<'static> {
        assert!(self.open.replace(false), "write without prepare");
        self.inner.write_message(msg)
    }

    fn read_message(&self) -> Option<MessageBuffer<'static>> {
        self.inner.read_message()
    }

    fn run_rx(&self) -> Option<MessageBuffer<'static>> {
        self.inner.run_rx()
    }
}

fn message(pool: &'static Pool, source_id: u8, command: bool) -> MessageBuffer<'static> {
    let mut msg = pool.alloc().unwrap();
    msg.set_header(Header {
        object: ObjectNumber::NW,
        instance: 1,
        command: Command::GET_ATTR,
        cmd_ext0: 1,
        cmd_ext1: 0,
        source_id,
        data_size: 0,
    });
    if !command {
        msg.set_response(0);
    }
    msg
}

fn setup() -> (&'static Pool, &'static Errors, &'static TestLink) {
    let pool: &'static Pool = Box::leak(Box::new(Pool::new()));
    let errors: &'static Errors = Box::leak(Box::new(Errors::default()));
    let link: &'static TestLink = Box::leak(Box::new(Link::new(GapTransport::new(pool), errors)));
    link.transport().link.set(Some(link));
    (pool, errors, link)
}

fn perform(link: &'static TestLink, action: Action) {
    let transport = link.transport();
    match action {
        Action::WriteCommand => {
            let id = transport.accept(true);
            match link.write_message(message(transport.pool, id, true)) {
                Ok(()) => {}
                Err(WriteError::CmdQueueFull) => transport.withdraw(true),
                Err(err) => panic!("unexpected {:?}", err),
            }
        }
        Action::WriteResponse => {
            let id = transport.accept(false);
            match link.write_message(message(transport.pool, id, false)) {
                Ok(()) => {}
                Err(WriteError::RespQueueFull) => transport.withdraw(false),
                Err(err) => panic!("unexpected {:?}", err),
            }
        }
        Action::CheckSend => link.check_send_message(),
        Action::ReceiveResponse => {
            let pending = {
                let model = transport.model.borrow();
                model.accepted > model.settled
            };
            if pending {
                transport.inner.push_rx(message(transport.pool, 0, false));
                let msg = link.read_message().unwrap();
                assert!(!msg.is_command());
                transport.model.borrow_mut().settled += 1;
            }
        }
    }
}

fn apply(link: &'static TestLink, op: Op) -> Result<(), TestCaseError> {
    let transport = link.transport();
    match op {
        Op::Run(Action::CheckSend) => {
            let (_, responses) = link.queued();
            let response_first = responses > 0 && transport.is_ready_for_write();
            link.check_send_message();
            if response_first {
                let written = transport.inner.written();
                prop_assert!(!written.is_empty());
                prop_assert!(!written[0].is_command());
            }
        }
        Op::Run(action) => perform(link, action),
        Op::SetReady { command, write } => transport.inner.set_ready(command, write),
        Op::SetSynchronous(synchronous) => transport.inner.set_synchronous(synchronous),
        Op::CompleteWrite => {
            if transport.inner.complete_write() {
                link.run_driver_rx();
            }
        }
        Op::Interrupt(action) => transport.armed.set(Some(action)),
    }
    Ok(())
}

fn check_invariants(link: &'static TestLink, pool: &'static Pool) -> Result<(), TestCaseError> {
    let transport = link.transport();
    for record in transport.inner.take_written() {
        let mut model = transport.model.borrow_mut();
        let expected = if record.is_command() {
            model.commands.pop_front()
        } else {
            model.responses.pop_front()
        };
        prop_assert_eq!(Some(record.source_id), expected);
    }

    prop_assert!(!link.is_write_in_progress());
    prop_assert!(!transport.open.get());

    let model = transport.model.borrow();
    let outstanding = link.outstanding_commands();
    prop_assert_eq!(outstanding, model.accepted - model.settled);
    prop_assert!(outstanding <= CMDS);
    prop_assert_eq!(link.num_cmd_queue_entries(), CMDS - outstanding);

    let (commands, responses) = link.queued();
    prop_assert!(commands <= CMDS && responses <= RESPS);
    prop_assert_eq!(model.commands.len(), commands);
    prop_assert_eq!(model.responses.len(), responses);
    prop_assert_eq!(
        pool.free_count(),
        POOL_SIZE - commands - responses - transport.inner.in_flight()
    );
    Ok(())
}

fn drain(link: &'static TestLink, pool: &'static Pool) -> Result<(), TestCaseError> {
    let transport = link.transport();
    transport.armed.set(None);
    transport.inner.set_ready(true, true);
    while transport.inner.complete_write() {
        link.run_driver_rx();
    }
    transport.inner.set_synchronous(true);
    for _ in 0..(CMDS + RESPS) {
        link.check_send_message();
    }
    check_invariants(link, pool)?;

    let model = transport.model.borrow();
    prop_assert!(model.commands.is_empty());
    prop_assert!(model.responses.is_empty());
    Ok(())
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_link_interleavings(ops in prop::collection::vec(op_strategy(), 0..200)) {
        let (pool, errors, link) = setup();
        for op in ops {
            apply(link, op)?;
            check_invariants(link, pool)?;
        }
        drain(link, pool)?;
        prop_assert_eq!(pool.free_count(), POOL_SIZE);
        prop_assert!(!errors.is_faulted());
    }
}
