//! Bounded, priority-aware host event queue
//!
//! Events bound for the host wait in a fixed pool of slots until the host
//! polls the notification channel. Every slot is in exactly one of three
//! states: free, queued (pending transmit) or in flight (copied into the
//! transmit buffer, awaiting host pickup confirmation on the next poll).
//! The pool size is the hard upper bound on queued plus in-flight events.
//!
//! Delivery is best effort: exhaustion is handled locally by retry, by
//! eviction of droppable events in favor of priority ones, or by dropping
//! the new event, never by a protocol error toward the host.

use core::cell::RefCell;

use critical_section::Mutex;
use embedded_hal::delay::DelayNs;
use pendant_protocol::event::{Event, EVENT_FLG_DROPPABLE, EVENT_FLG_TXQOVR, EVENT_MAX_SIZE};

/// Number of event slots in the pool
pub const QUEUE_CAPACITY: usize = 16;

/// Enqueue attempts per retry round
const RETRY_COUNT: u8 = 10;

/// Backoff between enqueue attempts (main-loop context only)
const RETRY_DELAY_MS: u32 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SlotState {
    /// Unused
    Free,
    /// Pending transmit; `order` establishes FIFO order within the pool
    Queued { order: u32 },
    /// Copied into the transmit buffer, awaiting host pickup confirmation
    InFlight,
}

#[derive(Clone, Copy)]
struct Slot {
    buf: [u8; EVENT_MAX_SIZE],
    size: u8,
    state: SlotState,
}

impl Slot {
    const fn new() -> Self {
        Slot {
            buf: [0; EVENT_MAX_SIZE],
            size: 0,
            state: SlotState::Free,
        }
    }

    fn event_id(&self) -> u8 {
        self.buf[0]
    }

    fn event_flags(&self) -> u8 {
        self.buf[1]
    }
}

struct QueueInner {
    slots: [Slot; QUEUE_CAPACITY],
    /// Next FIFO order stamp
    next_order: u32,
    /// Next host-visible sequence number, wraps at 256
    next_seqno: u8,
    /// An enqueue failed since the last transmit poll
    overflow: bool,
}

impl QueueInner {
    const fn new() -> Self {
        QueueInner {
            slots: [Slot::new(); QUEUE_CAPACITY],
            next_order: 0,
            next_seqno: 0,
            overflow: false,
        }
    }

    fn try_enqueue(&mut self, bytes: &[u8]) -> bool {
        let Some(slot) = self
            .slots
            .iter_mut()
            .find(|s| s.state == SlotState::Free)
        else {
            self.overflow = true;
            return false;
        };
        slot.buf[..bytes.len()].copy_from_slice(bytes);
        slot.size = bytes.len() as u8;
        slot.state = SlotState::Queued {
            order: self.next_order,
        };
        self.next_order = self.next_order.wrapping_add(1);
        true
    }

    /// Index of the oldest queued slot matching `pred`
    fn oldest_queued(&self, pred: impl Fn(&Slot) -> bool) -> Option<usize> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(i, s)| match s.state {
                SlotState::Queued { order } if pred(s) => Some((i, order)),
                _ => None,
            })
            .min_by_key(|&(_, order)| order)
            .map(|(i, _)| i)
    }
}

/// The host event queue
pub struct EventQueue {
    inner: Mutex<RefCell<QueueInner>>,
}

impl EventQueue {
    /// Create an empty queue
    pub const fn new() -> Self {
        EventQueue {
            inner: Mutex::new(RefCell::new(QueueInner::new())),
        }
    }

    /// Drop everything and clear the overflow flag (bus reset)
    pub fn reset(&self) {
        critical_section::with(|cs| {
            *self.inner.borrow_ref_mut(cs) = QueueInner::new();
        });
    }

    /// Number of slots currently queued for transmit
    pub fn queued_count(&self) -> usize {
        critical_section::with(|cs| {
            self.inner
                .borrow_ref(cs)
                .slots
                .iter()
                .filter(|s| matches!(s.state, SlotState::Queued { .. }))
                .count()
        })
    }

    /// Queue one event without retrying
    ///
    /// Returns `false` and records the overflow if no slot is free.
    pub fn enqueue(&self, event: &Event) -> bool {
        let mut buf = [0u8; EVENT_MAX_SIZE];
        let len = event.encode(&mut buf);
        critical_section::with(|cs| self.inner.borrow_ref_mut(cs).try_enqueue(&buf[..len]))
    }

    /// Queue one event, retrying with backoff. Main-loop context only.
    ///
    /// Retries leave the queue time to drain through the host poll. If the
    /// queue stays full and the event carries the priority flag, the oldest
    /// droppable queued event is evicted to make room. A non-priority event
    /// that finds no room is lost.
    pub fn send<D: DelayNs>(&self, delay: &mut D, event: &Event) {
        self.send_inner(Some(delay), event);
    }

    /// Queue one event from interrupt context
    ///
    /// Like [`send`](Self::send), but with a single enqueue attempt per
    /// round: the queue cannot drain while interrupts are masked, so waiting
    /// would be pointless.
    pub fn send_from_irq(&self, event: &Event) {
        self.send_inner::<NoopDelay>(None, event);
    }

    /// Replace any queued events of the same kind, then send
    ///
    /// Used for state-snapshot events where only the newest value matters.
    pub fn send_discard_old<D: DelayNs>(&self, delay: &mut D, event: &Event) {
        self.discard_by_id(event.kind.id());
        self.send(delay, event);
    }

    /// Interrupt-context variant of [`send_discard_old`](Self::send_discard_old)
    pub fn send_discard_old_from_irq(&self, event: &Event) {
        self.discard_by_id(event.kind.id());
        self.send_from_irq(event);
    }

    fn send_inner<D: DelayNs>(&self, mut delay: Option<&mut D>, event: &Event) {
        let mut buf = [0u8; EVENT_MAX_SIZE];
        let len = event.encode(&mut buf);
        let bytes = &buf[..len];

        loop {
            for _ in 0..RETRY_COUNT {
                let ok = critical_section::with(|cs| {
                    self.inner.borrow_ref_mut(cs).try_enqueue(bytes)
                });
                if ok {
                    return;
                }
                match delay.as_deref_mut() {
                    Some(d) => d.delay_ms(RETRY_DELAY_MS),
                    None => break, // Out of luck.
                }
            }
            #[cfg(feature = "defmt")]
            defmt::warn!("control event queue overflow");

            // Evict only in favor of higher priority events.
            if !event.is_priority() {
                break;
            }
            if !self.drop_one_droppable() {
                break;
            }
            #[cfg(feature = "defmt")]
            defmt::warn!("dropped one droppable event");
        }
        #[cfg(feature = "defmt")]
        defmt::warn!("event {=u8} lost", event.kind.id());
    }

    /// Return all queued events with the given ID to the free set
    fn discard_by_id(&self, id: u8) {
        critical_section::with(|cs| {
            let inner = &mut *self.inner.borrow_ref_mut(cs);
            for slot in &mut inner.slots {
                if matches!(slot.state, SlotState::Queued { .. }) && slot.event_id() == id {
                    slot.state = SlotState::Free;
                }
            }
        });
    }

    /// Evict the oldest queued droppable event, if any
    fn drop_one_droppable(&self) -> bool {
        critical_section::with(|cs| {
            let inner = &mut *self.inner.borrow_ref_mut(cs);
            match inner.oldest_queued(|s| s.event_flags() & EVENT_FLG_DROPPABLE != 0) {
                Some(idx) => {
                    inner.slots[idx].state = SlotState::Free;
                    true
                }
                None => false,
            }
        })
    }

    /// Transmit poll, called when the notification endpoint is ready
    ///
    /// Confirms pickup of everything handed out on the previous poll, then
    /// copies the oldest queued event into `buf`, stamps the next sequence
    /// number, and reports a pending overflow on the event's flags. Returns
    /// the copied size, or 0 with no state change if nothing is queued.
    pub fn tx_poll(&self, buf: &mut [u8]) -> usize {
        assert!(buf.len() >= EVENT_MAX_SIZE);

        critical_section::with(|cs| {
            let inner = &mut *self.inner.borrow_ref_mut(cs);

            // The host consumed the previous poll's payload.
            for slot in &mut inner.slots {
                if slot.state == SlotState::InFlight {
                    slot.state = SlotState::Free;
                }
            }

            let Some(idx) = inner.oldest_queued(|_| true) else {
                return 0;
            };
            let seqno = inner.next_seqno;
            inner.next_seqno = seqno.wrapping_add(1);
            let overflowed = core::mem::take(&mut inner.overflow);

            let slot = &mut inner.slots[idx];
            slot.buf[3] = seqno;
            if overflowed {
                slot.buf[1] |= EVENT_FLG_TXQOVR;
            }
            slot.state = SlotState::InFlight;

            let len = slot.size as usize;
            buf[..len].copy_from_slice(&slot.buf[..len]);
            len
        })
    }
}

impl Default for EventQueue {
    fn default() -> Self {
        Self::new()
    }
}

/// Placeholder delay type for the interrupt-context send paths
struct NoopDelay;

impl DelayNs for NoopDelay {
    fn delay_ns(&mut self, _ns: u32) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::NoDelay;
    use pendant_protocol::event::{EventKind, EVENT_FLG_PRIO, EV_FEEDOVERRIDE, EV_HALT};

    fn feed_event(state: u8) -> Event {
        Event::with_flags(EventKind::FeedOverride { state }, EVENT_FLG_DROPPABLE)
    }

    fn poll(queue: &EventQueue) -> Option<(Event, u8)> {
        let mut buf = [0u8; EVENT_MAX_SIZE];
        let len = queue.tx_poll(&mut buf);
        if len == 0 {
            return None;
        }
        Event::decode(&buf[..len])
    }

    #[test]
    fn test_fifo_order_and_seqno() {
        let queue = EventQueue::new();
        for state in 0..3 {
            assert!(queue.enqueue(&feed_event(state)));
        }
        for expect in 0..3u8 {
            let (ev, seqno) = poll(&queue).unwrap();
            assert_eq!(seqno, expect);
            assert_eq!(ev.kind, EventKind::FeedOverride { state: expect });
        }
        assert!(poll(&queue).is_none());
    }

    #[test]
    fn test_seqno_wraps() {
        let queue = EventQueue::new();
        for _ in 0..=255 {
            assert!(queue.enqueue(&Event::new(EventKind::Halt)));
            poll(&queue).unwrap();
        }
        queue.enqueue(&Event::new(EventKind::Halt));
        let (_, seqno) = poll(&queue).unwrap();
        assert_eq!(seqno, 0);
    }

    #[test]
    fn test_empty_poll_is_idempotent() {
        let queue = EventQueue::new();
        let mut buf = [0u8; EVENT_MAX_SIZE];
        for _ in 0..5 {
            assert_eq!(queue.tx_poll(&mut buf), 0);
        }
        // Sequence numbers are not burned on empty polls
        queue.enqueue(&Event::new(EventKind::Halt));
        let (_, seqno) = poll(&queue).unwrap();
        assert_eq!(seqno, 0);
    }

    #[test]
    fn test_capacity_bound_without_droppables() {
        let queue = EventQueue::new();
        let ev = Event::new(EventKind::Halt); // not droppable
        for _ in 0..QUEUE_CAPACITY {
            assert!(queue.enqueue(&ev));
        }
        assert!(!queue.enqueue(&ev));
        assert_eq!(queue.queued_count(), QUEUE_CAPACITY);
        // A non-priority send is abandoned; nothing is lost from the pool
        queue.send(&mut NoDelay, &ev);
        assert_eq!(queue.queued_count(), QUEUE_CAPACITY);
    }

    #[test]
    fn test_priority_evicts_exactly_one_droppable() {
        let queue = EventQueue::new();
        assert!(queue.enqueue(&feed_event(1)));
        let halt = Event::new(EventKind::Halt);
        for _ in 0..QUEUE_CAPACITY - 1 {
            assert!(queue.enqueue(&halt));
        }
        assert_eq!(queue.queued_count(), QUEUE_CAPACITY);

        let prio = Event::with_flags(EventKind::Spindle { state: 1 }, EVENT_FLG_PRIO);
        queue.send(&mut NoDelay, &prio);
        assert_eq!(queue.queued_count(), QUEUE_CAPACITY);

        // The droppable feed-override event is gone; everything else survives
        let mut ids = std::vec::Vec::new();
        while let Some((ev, _)) = poll(&queue) {
            ids.push(ev.kind.id());
        }
        assert!(!ids.contains(&EV_FEEDOVERRIDE));
        assert_eq!(ids.iter().filter(|&&id| id == EV_HALT).count(), QUEUE_CAPACITY - 1);
    }

    #[test]
    fn test_priority_send_fails_without_droppables() {
        let queue = EventQueue::new();
        let halt = Event::new(EventKind::Halt);
        for _ in 0..QUEUE_CAPACITY {
            assert!(queue.enqueue(&halt));
        }
        let prio = Event::with_flags(EventKind::Spindle { state: 1 }, EVENT_FLG_PRIO);
        queue.send(&mut NoDelay, &prio);
        assert_eq!(queue.queued_count(), QUEUE_CAPACITY);
    }

    #[test]
    fn test_send_discard_old_coalesces() {
        let queue = EventQueue::new();
        queue.send_discard_old(&mut NoDelay, &feed_event(10));
        queue.send_discard_old(&mut NoDelay, &feed_event(20));
        queue.send_discard_old(&mut NoDelay, &feed_event(30));
        assert_eq!(queue.queued_count(), 1);
        let (ev, _) = poll(&queue).unwrap();
        assert_eq!(ev.kind, EventKind::FeedOverride { state: 30 });
    }

    #[test]
    fn test_overflow_bit_reported_once() {
        let queue = EventQueue::new();
        let halt = Event::new(EventKind::Halt);
        for _ in 0..QUEUE_CAPACITY {
            queue.enqueue(&halt);
        }
        // Overflow happens here
        assert!(!queue.enqueue(&halt));

        let (ev, _) = poll(&queue).unwrap();
        assert!(ev.flags & EVENT_FLG_TXQOVR != 0);
        // Reported once, then cleared
        let (ev, _) = poll(&queue).unwrap();
        assert!(ev.flags & EVENT_FLG_TXQOVR == 0);
    }

    #[test]
    fn test_inflight_returns_after_next_poll() {
        let queue = EventQueue::new();
        let halt = Event::new(EventKind::Halt);
        for _ in 0..QUEUE_CAPACITY {
            queue.enqueue(&halt);
        }
        // One slot goes in flight; the pool is still exhausted
        poll(&queue).unwrap();
        assert!(!queue.enqueue(&halt));
        // The next poll confirms pickup and frees it
        poll(&queue).unwrap();
        assert!(queue.enqueue(&halt));
    }

    #[test]
    fn test_reset_clears_everything() {
        let queue = EventQueue::new();
        for _ in 0..QUEUE_CAPACITY {
            queue.enqueue(&Event::new(EventKind::Halt));
        }
        queue.reset();
        assert_eq!(queue.queued_count(), 0);
        queue.enqueue(&Event::new(EventKind::Halt));
        let (ev, seqno) = poll(&queue).unwrap();
        assert_eq!(seqno, 0);
        assert!(ev.flags & EVENT_FLG_TXQOVR == 0);
    }
}
