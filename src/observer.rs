//! Derived-model observers
//!
//! Extensions layered on top of the base model register a block of
//! optional callbacks. The blocks are invoked in registration order,
//! and that order is observable, so it is preserved here by keeping
//! the blocks in a plain vector.

use std::fmt;

use crate::mode::PrivMode;
use crate::trap::{Trap, TrapDescriptor};

/// Callback block for one derived model. Every entry point is
/// optional; the defaults do nothing.
pub trait Observer {
    /// A trap was taken into the given mode
    fn trap_notifier(&mut self, _hart: u32, _mode: PrivMode, _trap: Trap) {}

    /// An xRET (or Debug resume) returned to the given mode
    fn eret_notifier(&mut self, _hart: u32, _mode: PrivMode) {}

    /// The hart completed a full reset
    fn reset_notifier(&mut self, _hart: u32) {}

    /// The hart stopped (running = false) or resumed (running = true)
    fn halt_restart_notifier(&mut self, _hart: u32, _running: bool) {}

    /// Additional trap descriptors this model contributes to the
    /// catalogue
    fn extra_traps(&self) -> &[TrapDescriptor] {
        &[]
    }

    /// Snap a load address before it is used
    fn read_address_snap(&self, addr: u64) -> u64 {
        addr
    }

    /// Snap a store address before it is used
    fn write_address_snap(&self, addr: u64) -> u64 {
        addr
    }
}

/// The registered callback blocks, in registration order
#[derive(Default)]
pub struct ObserverList {
    observers: Vec<Box<dyn Observer>>,
}

impl fmt::Debug for ObserverList {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "ObserverList({} registered)", self.observers.len())
    }
}

impl ObserverList {
    pub fn register(&mut self, observer: Box<dyn Observer>) {
        self.observers.push(observer);
    }

    pub fn notify_trap(&mut self, hart: u32, mode: PrivMode, trap: Trap) {
        for observer in self.observers.iter_mut() {
            observer.trap_notifier(hart, mode, trap);
        }
    }

    pub fn notify_eret(&mut self, hart: u32, mode: PrivMode) {
        for observer in self.observers.iter_mut() {
            observer.eret_notifier(hart, mode);
        }
    }

    pub fn notify_reset(&mut self, hart: u32) {
        for observer in self.observers.iter_mut() {
            observer.reset_notifier(hart);
        }
    }

    pub fn notify_halt_restart(&mut self, hart: u32, running: bool) {
        for observer in self.observers.iter_mut() {
            observer.halt_restart_notifier(hart, running);
        }
    }

    /// All extra trap descriptors, in registration order
    pub fn extra_traps(&self) -> Vec<TrapDescriptor> {
        self.observers
            .iter()
            .flat_map(|observer| observer.extra_traps().iter().copied())
            .collect()
    }

    /// Run an address through every registered read snap, in order
    pub fn snap_read_address(&self, addr: u64) -> u64 {
        self.observers
            .iter()
            .fold(addr, |addr, observer| observer.read_address_snap(addr))
    }

    /// Run an address through every registered write snap, in order
    pub fn snap_write_address(&self, addr: u64) -> u64 {
        self.observers
            .iter()
            .fold(addr, |addr, observer| observer.write_address_snap(addr))
    }
}

#[cfg(test)]
mod tests {

    use std::cell::RefCell;
    use std::rc::Rc;

    use super::*;

    #[derive(Debug)]
    struct Recorder {
        tag: &'static str,
        record: Rc<RefCell<Vec<String>>>,
    }

    impl Observer for Recorder {
        fn trap_notifier(&mut self, hart: u32, mode: PrivMode, _trap: Trap) {
            self.record.borrow_mut().push(format!(
                "{}: trap hart {} to {}",
                self.tag,
                hart,
                mode.letter()
            ));
        }

        fn read_address_snap(&self, addr: u64) -> u64 {
            addr & !0x3
        }
    }

    #[test]
    fn check_notifications_fire_in_registration_order() {
        let record = Rc::new(RefCell::new(Vec::new()));
        let mut list = ObserverList::default();
        list.register(Box::new(Recorder {
            tag: "first",
            record: Rc::clone(&record),
        }));
        list.register(Box::new(Recorder {
            tag: "second",
            record: Rc::clone(&record),
        }));

        list.notify_trap(
            0,
            PrivMode::Machine,
            Trap::Exception(crate::trap::Exception::IllegalInstruction),
        );
        assert_eq!(
            *record.borrow(),
            vec!["first: trap hart 0 to m", "second: trap hart 0 to m"]
        );
    }

    #[test]
    fn check_address_snap_composes() {
        let record = Rc::new(RefCell::new(Vec::new()));
        let mut list = ObserverList::default();
        assert_eq!(list.snap_read_address(0x1007), 0x1007);
        list.register(Box::new(Recorder { tag: "snap", record }));
        assert_eq!(list.snap_read_address(0x1007), 0x1004);
    }
}
