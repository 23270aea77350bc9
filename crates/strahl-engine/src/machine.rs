//! Machine construction, propagation, and reconfiguration.
//!
//! A [`Machine`] owns an ordered, indexed pipeline of elements built from
//! a config via the process-wide registry. [`propagate`](Machine::propagate)
//! drives a state through the pipeline element by element, honouring
//! `next_elem` overrides, observers, and an optional trace sink.

use std::collections::BTreeMap;
use std::error::Error;
use std::fmt;
use std::io::Write;

use strahl_core::{
    AdvanceError, BuildError, Config, ConfigError, DisplayElement, DisplayState, Element, Observer,
    State,
};

use crate::registry::{self, RebuildError, SimTypeInfo};

// ── Errors ─────────────────────────────────────────────────────────

/// Errors from machine construction and reconfiguration.
///
/// A construction failure leaves no partially-built machine observable;
/// a reconfiguration failure leaves the existing element untouched.
#[derive(Clone, Debug, PartialEq)]
pub enum MachineError {
    /// The config's `sim_type` string is not registered.
    UnknownSimType {
        /// The unresolvable name.
        sim_type: String,
    },
    /// An element config's `type` string is not in the bound catalogue.
    UnknownElemType {
        /// The unresolvable element-type name.
        elem_type: String,
    },
    /// A required config key was absent while building one element.
    MissingParameter {
        /// Pipeline index of the element being built.
        index: usize,
        /// Declared element name, or `"<invalid>"` if unreadable.
        name: String,
        /// The missing key.
        key: String,
    },
    /// Any other failure while building one element.
    Construction {
        /// Pipeline index of the element being built.
        index: usize,
        /// Declared element name, or `"<invalid>"` if unreadable.
        name: String,
        /// Description of the failure.
        reason: String,
    },
    /// Reconfiguration addressed an index beyond the pipeline.
    IndexOutOfRange {
        /// The requested index.
        index: usize,
        /// Number of elements in the pipeline.
        len: usize,
    },
    /// Reconfiguration resolved to a different element kind.
    TypeMismatch {
        /// Pipeline index of the addressed element.
        index: usize,
        /// Type name of the existing element.
        expected: &'static str,
        /// Type name the new config resolved to.
        requested: &'static str,
    },
    /// A machine-level config lookup (`sim_type`, `elements`) failed.
    Config(ConfigError),
}

impl fmt::Display for MachineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownSimType { sim_type } => {
                write!(f, "unsupported sim_type '{sim_type}'")
            }
            Self::UnknownElemType { elem_type } => {
                write!(f, "unknown element type '{elem_type}'")
            }
            Self::MissingParameter { index, name, key } => {
                write!(
                    f,
                    "error while initializing element {index} '{name}': \
                     missing required parameter '{key}'"
                )
            }
            Self::Construction {
                index,
                name,
                reason,
            } => {
                write!(f, "error while constructing element {index} '{name}': {reason}")
            }
            Self::IndexOutOfRange { index, len } => {
                write!(f, "element index {index} out of range (pipeline has {len} elements)")
            }
            Self::TypeMismatch {
                index,
                expected,
                requested,
            } => {
                write!(
                    f,
                    "reconfigure cannot change element kind \
                     (element {index} is '{expected}', requested '{requested}')"
                )
            }
            Self::Config(e) => write!(f, "{e}"),
        }
    }
}

impl Error for MachineError {}

/// Wrap a builder failure with the element's pipeline index and declared
/// name. Missing config keys become `MissingParameter`; everything else
/// becomes `Construction`.
fn annotate(index: usize, name: &str, err: BuildError) -> MachineError {
    match err {
        BuildError::Config(ConfigError::Missing { key }) => MachineError::MissingParameter {
            index,
            name: name.to_string(),
            key,
        },
        other => MachineError::Construction {
            index,
            name: name.to_string(),
            reason: other.to_string(),
        },
    }
}

/// The element's declared name for error annotation, falling back to a
/// placeholder when the name itself is unreadable.
fn declared_name(conf: &Config) -> &str {
    conf.get_str_or("name", "<invalid>").unwrap_or("<invalid>")
}

// ── Machine ────────────────────────────────────────────────────────

/// Lookup tables are keyed by string then rank, so a range scan yields
/// same-named (or same-typed) elements in pipeline order.
type Lookup = BTreeMap<(String, usize), usize>;

/// An ordered, indexed element pipeline bound to one simulation type.
///
/// The machine owns its elements exclusively. Propagation takes
/// `&mut self`, so the borrow checker enforces that a machine runs one
/// propagation at a time and that no element's cached data is touched
/// concurrently; callers wanting parallel propagation use independent
/// machines.
pub struct Machine {
    info: SimTypeInfo,
    conf: Config,
    elements: Vec<Box<dyn Element>>,
    lookup_name: Lookup,
    lookup_type: Lookup,
    trace: Option<Box<dyn Write + Send>>,
}

impl fmt::Debug for Machine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Machine")
            .field("info", &self.info)
            .field("elements", &self.elements.len())
            .field("tracing", &self.trace.is_some())
            .finish()
    }
}

impl Machine {
    /// Build a machine from a config carrying a `sim_type` string and an
    /// ordered `elements` list of per-element configs.
    ///
    /// The registry lock is held only for the simulation-type lookup;
    /// element building (which may do heavy work such as integrating
    /// field tables) runs outside it. Construction is atomic: on any
    /// failure no machine is returned and nothing is observable.
    pub fn new(conf: &Config) -> Result<Self, MachineError> {
        let sim_type = conf.get_str("sim_type").map_err(MachineError::Config)?;
        let info = registry::lookup(sim_type).map_err(|_| MachineError::UnknownSimType {
            sim_type: sim_type.to_string(),
        })?;

        let element_confs = conf.get_configs("elements").map_err(MachineError::Config)?;
        let mut elements: Vec<Box<dyn Element>> = Vec::with_capacity(element_confs.len());

        for (index, ec) in element_confs.iter().enumerate() {
            let elem_type = ec
                .get_str("type")
                .map_err(|e| annotate(index, declared_name(ec), e.into()))?;
            let builder =
                info.element_builder(elem_type)
                    .ok_or_else(|| MachineError::UnknownElemType {
                        elem_type: elem_type.to_string(),
                    })?;
            let mut element = builder
                .build(ec)
                .map_err(|e| annotate(index, declared_name(ec), e))?;
            element.core_mut().set_index(index);
            elements.push(element);
        }

        let (lookup_name, lookup_type) = Self::build_lookup(&elements);

        Ok(Self {
            info,
            conf: conf.clone(),
            elements,
            lookup_name,
            lookup_type,
            trace: None,
        })
    }

    fn build_lookup(elements: &[Box<dyn Element>]) -> (Lookup, Lookup) {
        let mut by_name = Lookup::new();
        let mut by_type = Lookup::new();
        for (index, element) in elements.iter().enumerate() {
            by_name.insert((element.core().name().to_string(), index), index);
            by_type.insert((element.type_name().to_string(), index), index);
        }
        (by_name, by_type)
    }

    /// The simulation-type name this machine is bound to.
    pub fn sim_type(&self) -> &str {
        self.info.name()
    }

    /// The config this machine was built from.
    pub fn conf(&self) -> &Config {
        &self.conf
    }

    /// Number of elements in the pipeline.
    pub fn len(&self) -> usize {
        self.elements.len()
    }

    /// Whether the pipeline is empty.
    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    /// The element at pipeline position `index`.
    pub fn get(&self, index: usize) -> Option<&dyn Element> {
        self.elements.get(index).map(Box::as_ref)
    }

    /// Mutable access to the element at pipeline position `index`
    /// (observer installation, cache inspection).
    pub fn get_mut(&mut self, index: usize) -> Option<&mut dyn Element> {
        self.elements.get_mut(index).map(Box::as_mut)
    }

    /// Iterate the pipeline in order.
    pub fn iter(&self) -> impl Iterator<Item = &dyn Element> {
        self.elements.iter().map(Box::as_ref)
    }

    /// The `nth` element with the given instance name, in pipeline order.
    pub fn find(&self, name: &str, nth: usize) -> Option<&dyn Element> {
        self.equal_range(name).nth(nth)
    }

    /// All elements with the given instance name, in pipeline order.
    pub fn equal_range(&self, name: &str) -> impl Iterator<Item = &dyn Element> + '_ {
        self.lookup_name
            .range((name.to_string(), 0)..=(name.to_string(), usize::MAX))
            .map(|(_, &i)| self.elements[i].as_ref())
    }

    /// All elements with the given type name, in pipeline order.
    pub fn equal_range_type(&self, elem_type: &str) -> impl Iterator<Item = &dyn Element> + '_ {
        self.lookup_type
            .range((elem_type.to_string(), 0)..=(elem_type.to_string(), usize::MAX))
            .map(|(_, &i)| self.elements[i].as_ref())
    }

    /// Attach or detach the trace sink; each propagation step appends one
    /// line (`After <step> <state>`) to it. Returns the previous sink.
    pub fn set_trace(&mut self, sink: Option<Box<dyn Write + Send>>) -> Option<Box<dyn Write + Send>> {
        std::mem::replace(&mut self.trace, sink)
    }

    /// Construct a state of the bound simulation type.
    pub fn alloc_state(&self, conf: &Config) -> Result<Box<dyn State>, BuildError> {
        self.info.alloc_state(conf)
    }

    /// Construct a state with an empty config (all scalar defaults).
    pub fn alloc_state_default(&self) -> Result<Box<dyn State>, BuildError> {
        self.alloc_state(&Config::new())
    }

    /// Drive `state` through the pipeline.
    ///
    /// Sets `state.next_elem = start`, then repeats up to `max` times,
    /// stopping early when `next_elem` reaches the pipeline length: the
    /// element at `next_elem` is fetched, `next_elem` is incremented
    /// *before* `advance` runs (so an element may overwrite it to branch
    /// or loop), the element's observer (if any) sees the post-advance
    /// state, and the trace sink (if any) receives one line.
    ///
    /// On success `state` reflects every visited element in order. On an
    /// advance failure the error propagates unmodified and `state` is
    /// left partially updated — discard it.
    pub fn propagate(
        &mut self,
        state: &mut dyn State,
        start: usize,
        max: usize,
    ) -> Result<(), AdvanceError> {
        let nelem = self.elements.len();
        state.core_mut().next_elem = start;
        for step in 0..max {
            let index = state.core().next_elem;
            if index >= nelem {
                break;
            }
            state.core_mut().next_elem = index + 1;
            let element = &mut self.elements[index];
            element.advance(state)?;
            if let Some(observer) = element.core().observer() {
                observer.view(element.as_ref(), &*state);
            }
            if let Some(sink) = self.trace.as_mut() {
                // Trace output is best-effort; a full sink must not abort
                // the propagation.
                let _ = writeln!(sink, "After {step} {}", DisplayState(&*state));
            }
        }
        Ok(())
    }

    /// [`propagate`](Machine::propagate) from the first element with no
    /// step bound.
    pub fn propagate_all(&mut self, state: &mut dyn State) -> Result<(), AdvanceError> {
        self.propagate(state, 0, usize::MAX)
    }

    /// Install `observer` on the element at `index`, replacing any
    /// existing one. Fails with [`MachineError::IndexOutOfRange`] past
    /// the pipeline end.
    pub fn set_observer(
        &mut self,
        index: usize,
        observer: Option<Box<dyn Observer>>,
    ) -> Result<(), MachineError> {
        let len = self.elements.len();
        let element = self
            .elements
            .get_mut(index)
            .ok_or(MachineError::IndexOutOfRange { index, len })?;
        element.core_mut().set_observer(observer);
        Ok(())
    }

    /// Rebuild the element at `index` from a new config of the *same
    /// kind*, in place.
    ///
    /// The element's storage identity, pipeline index, and observer are
    /// preserved; its name and configuration-derived parameters come from
    /// the new config. Fails with [`MachineError::TypeMismatch`] when the
    /// new config resolves to a different kind, leaving the element
    /// untouched.
    pub fn reconfigure(&mut self, index: usize, conf: &Config) -> Result<(), MachineError> {
        let len = self.elements.len();
        if index >= len {
            return Err(MachineError::IndexOutOfRange { index, len });
        }
        let elem_type = conf.get_str("type").map_err(MachineError::Config)?;
        let builder =
            self.info
                .element_builder(elem_type)
                .ok_or_else(|| MachineError::UnknownElemType {
                    elem_type: elem_type.to_string(),
                })?;
        builder
            .rebuild(&mut self.elements[index], conf)
            .map_err(|e| match e {
                RebuildError::TypeMismatch {
                    expected,
                    requested,
                } => MachineError::TypeMismatch {
                    index,
                    expected,
                    requested,
                },
                RebuildError::Build(b) => annotate(index, declared_name(conf), b),
            })?;
        // The name may have changed; lookup entries must exactly mirror
        // the owned elements.
        let (by_name, by_type) = Self::build_lookup(&self.elements);
        self.lookup_name = by_name;
        self.lookup_type = by_type;
        Ok(())
    }
}

impl fmt::Display for Machine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "sim_type: {}", self.info.name())?;
        writeln!(f, "#Elements: {}", self.elements.len())?;
        for element in &self.elements {
            writeln!(f, "{}", DisplayElement(element.as_ref()))?;
        }
        Ok(())
    }
}

// ── Test fixtures ──────────────────────────────────────────────────


#[cfg(test)]
mod tests {
    use super::testutil::*;
    use super::*;
    use std::sync::{Arc, Mutex};

    fn markers(n: usize) -> Vec<Config> {
        (0..n).map(|i| elem(&format!("m{i}"), "marker")).collect()
    }

    fn new_machine(elements: Vec<Config>) -> Machine {
        register_test_sim();
        Machine::new(&machine_conf(elements)).unwrap()
    }

    fn visited(state: &dyn State) -> Vec<usize> {
        state
            .as_any()
            .downcast_ref::<TestState>()
            .unwrap()
            .visited
            .clone()
    }

    // ── Construction ───────────────────────────────────────────

    #[test]
    fn elements_indexed_in_configuration_order() {
        let m = new_machine(markers(4));
        assert_eq!(m.len(), 4);
        for i in 0..4 {
            let e = m.get(i).unwrap();
            assert_eq!(e.core().index(), i);
            assert_eq!(e.core().name(), format!("m{i}"));
        }
    }

    #[test]
    fn unknown_sim_type_rejected() {
        register_test_sim();
        let conf = Config::new()
            .with("sim_type", "no_such_sim")
            .with("elements", Vec::<Config>::new());
        let err = Machine::new(&conf).unwrap_err();
        assert_eq!(
            err,
            MachineError::UnknownSimType {
                sim_type: "no_such_sim".into()
            }
        );
    }

    #[test]
    fn unknown_element_type_rejected() {
        register_test_sim();
        let err = Machine::new(&machine_conf(vec![elem("q0", "quadrupole")])).unwrap_err();
        assert_eq!(
            err,
            MachineError::UnknownElemType {
                elem_type: "quadrupole".into()
            }
        );
    }

    #[test]
    fn missing_parameter_annotated_with_index_and_name() {
        register_test_sim();
        // hop requires "target"
        let err = Machine::new(&machine_conf(vec![
            elem("m0", "marker"),
            elem("h1", "hop"),
        ]))
        .unwrap_err();
        assert_eq!(
            err,
            MachineError::MissingParameter {
                index: 1,
                name: "h1".into(),
                key: "target".into()
            }
        );
    }

    #[test]
    fn unreadable_name_gets_placeholder() {
        register_test_sim();
        // no "name" key at all: ElementCore requires it, so building
        // fails, and the annotation falls back to the placeholder
        let err =
            Machine::new(&machine_conf(vec![Config::new().with("type", "marker")])).unwrap_err();
        assert_eq!(
            err,
            MachineError::MissingParameter {
                index: 0,
                name: "<invalid>".into(),
                key: "name".into()
            }
        );
    }

    #[test]
    fn find_and_equal_range_in_pipeline_order() {
        let m = new_machine(vec![
            elem("a", "marker"),
            elem("b", "marker"),
            elem("a", "marker"),
        ]);
        let indices: Vec<usize> = m.equal_range("a").map(|e| e.core().index()).collect();
        assert_eq!(indices, [0, 2]);
        assert_eq!(m.find("a", 0).unwrap().core().index(), 0);
        assert_eq!(m.find("a", 1).unwrap().core().index(), 2);
        assert!(m.find("a", 2).is_none());
        assert!(m.find("c", 0).is_none());

        let by_type: Vec<usize> = m
            .equal_range_type("marker")
            .map(|e| e.core().index())
            .collect();
        assert_eq!(by_type, [0, 1, 2]);
    }

    // ── Propagation ────────────────────────────────────────────

    #[test]
    fn propagate_visits_every_element_once() {
        let mut m = new_machine(markers(5));
        let mut state = m.alloc_state_default().unwrap();
        m.propagate(state.as_mut(), 0, 5).unwrap();
        assert_eq!(visited(state.as_ref()), [0, 1, 2, 3, 4]);
        assert_eq!(state.core().next_elem, 5);
    }

    #[test]
    fn propagate_bounded_by_max_steps() {
        let mut m = new_machine(markers(5));
        let mut state = m.alloc_state_default().unwrap();
        m.propagate(state.as_mut(), 0, 3).unwrap();
        assert_eq!(visited(state.as_ref()), [0, 1, 2]);
        assert_eq!(state.core().next_elem, 3);
    }

    #[test]
    fn propagate_from_start_offset() {
        let mut m = new_machine(markers(4));
        let mut state = m.alloc_state_default().unwrap();
        m.propagate(state.as_mut(), 2, usize::MAX).unwrap();
        assert_eq!(visited(state.as_ref()), [2, 3]);
        assert_eq!(state.core().next_elem, 4);
    }

    #[test]
    fn hop_element_revisits_earlier_elements() {
        // pipeline: marker, hop(target=0); the hop rewinds to the start,
        // so a bounded run alternates between the two
        let mut m = new_machine(vec![
            elem("m0", "marker"),
            elem("h1", "hop").with("target", 0.0),
        ]);
        let mut state = m.alloc_state_default().unwrap();
        m.propagate(state.as_mut(), 0, 5).unwrap();
        assert_eq!(visited(state.as_ref()), [0, 1, 0, 1, 0]);
        assert_eq!(state.core().next_elem, 1);
    }

    #[test]
    fn advance_failure_propagates_unmodified() {
        let mut m = new_machine(vec![elem("m0", "marker"), elem("f1", "fail")]);
        let mut state = m.alloc_state_default().unwrap();
        let err = m.propagate_all(state.as_mut()).unwrap_err();
        assert_eq!(
            err,
            AdvanceError::Numerical {
                element: "f1".into(),
                reason: "synthetic failure".into()
            }
        );
    }

    #[test]
    fn pos_accumulates_element_lengths() {
        register_test_sim();
        let mut m = new_machine(vec![
            elem("m0", "marker").with("L", 1.5),
            elem("m1", "marker").with("L", 0.25),
        ]);
        let mut state = m.alloc_state_default().unwrap();
        m.propagate_all(state.as_mut()).unwrap();
        assert_eq!(state.core().pos, 1.75);
    }

    // ── Observers and tracing ──────────────────────────────────

    struct Recorder {
        seen: Arc<Mutex<Vec<(usize, usize)>>>,
    }

    impl Observer for Recorder {
        fn view(&self, element: &dyn Element, state: &dyn State) {
            self.seen
                .lock()
                .unwrap()
                .push((element.core().index(), state.core().next_elem));
        }
    }

    #[test]
    fn observer_sees_post_advance_state() {
        let mut m = new_machine(markers(3));
        let seen = Arc::new(Mutex::new(Vec::new()));
        m.set_observer(1, Some(Box::new(Recorder { seen: seen.clone() })))
            .unwrap();
        let mut state = m.alloc_state_default().unwrap();
        m.propagate_all(state.as_mut()).unwrap();
        // only element 1 is observed; next_elem was already incremented
        assert_eq!(seen.lock().unwrap().as_slice(), [(1, 2)]);
    }

    #[test]
    fn observer_on_bad_index_rejected() {
        let mut m = new_machine(markers(1));
        let err = m.set_observer(5, None).unwrap_err();
        assert_eq!(err, MachineError::IndexOutOfRange { index: 5, len: 1 });
    }

    #[derive(Clone)]
    struct SharedSink(Arc<Mutex<Vec<u8>>>);

    impl Write for SharedSink {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }
        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn trace_sink_gets_one_line_per_step() {
        let mut m = new_machine(markers(3));
        let buf = Arc::new(Mutex::new(Vec::new()));
        m.set_trace(Some(Box::new(SharedSink(buf.clone()))));
        let mut state = m.alloc_state_default().unwrap();
        m.propagate_all(state.as_mut()).unwrap();
        let text = String::from_utf8(buf.lock().unwrap().clone()).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("After 0 "));
        assert!(lines[2].starts_with("After 2 "));
    }

    #[test]
    fn detached_trace_stops_appending() {
        let mut m = new_machine(markers(2));
        let buf = Arc::new(Mutex::new(Vec::new()));
        m.set_trace(Some(Box::new(SharedSink(buf.clone()))));
        m.set_trace(None);
        let mut state = m.alloc_state_default().unwrap();
        m.propagate_all(state.as_mut()).unwrap();
        assert!(buf.lock().unwrap().is_empty());
    }

    // ── Reconfiguration ────────────────────────────────────────

    #[test]
    fn reconfigure_same_kind_updates_in_place() {
        let mut m = new_machine(vec![
            elem("m0", "marker").with("L", 1.0),
            elem("h1", "hop").with("target", 0.0),
        ]);
        let seen = Arc::new(Mutex::new(Vec::new()));
        m.set_observer(0, Some(Box::new(Recorder { seen: seen.clone() })))
            .unwrap();

        m.reconfigure(0, &elem("m0renamed", "marker").with("L", 2.5))
            .unwrap();

        let e = m.get(0).unwrap();
        assert_eq!(e.core().name(), "m0renamed");
        assert_eq!(e.core().index(), 0);
        assert_eq!(e.core().length, 2.5);
        // observer survived the rebuild
        assert!(e.core().observer().is_some());
        // lookup tables follow the rename
        assert!(m.find("m0", 0).is_none());
        assert_eq!(m.find("m0renamed", 0).unwrap().core().index(), 0);
    }

    #[test]
    fn reconfigure_cannot_change_kind() {
        let mut m = new_machine(vec![elem("m0", "marker").with("L", 1.0)]);
        let err = m
            .reconfigure(0, &elem("h0", "hop").with("target", 0.0))
            .unwrap_err();
        assert_eq!(
            err,
            MachineError::TypeMismatch {
                index: 0,
                expected: "marker",
                requested: "hop"
            }
        );
        // existing element untouched
        let e = m.get(0).unwrap();
        assert_eq!(e.core().name(), "m0");
        assert_eq!(e.core().length, 1.0);
    }

    #[test]
    fn reconfigure_out_of_range() {
        let mut m = new_machine(markers(2));
        let err = m.reconfigure(7, &elem("x", "marker")).unwrap_err();
        assert_eq!(err, MachineError::IndexOutOfRange { index: 7, len: 2 });
    }

    // ── Rendering ──────────────────────────────────────────────

    #[test]
    fn machine_display_lists_elements() {
        let m = new_machine(vec![elem("m0", "marker"), elem("m1", "marker")]);
        let text = m.to_string();
        assert!(text.starts_with(&format!("sim_type: {SIM}\n#Elements: 2\n")));
        assert!(text.contains("Element 0: m0 (marker)"));
        assert!(text.contains("Element 1: m1 (marker)"));
    }

    // ── Step-count properties ──────────────────────────────────

    mod props {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn next_elem_is_min_of_len_and_max(n in 0usize..20, max in 0usize..30) {
                let mut m = new_machine(markers(n));
                let mut state = m.alloc_state_default().unwrap();
                m.propagate(state.as_mut(), 0, max).unwrap();
                prop_assert_eq!(state.core().next_elem, n.min(max));
                prop_assert_eq!(visited(state.as_ref()).len(), n.min(max));
            }
        }
    }

    // ── State cloning ──────────────────────────────────────────

    #[test]
    fn clone_is_independent_of_original() {
        let mut m = new_machine(markers(2));
        let mut state = m.alloc_state_default().unwrap();
        m.propagate_all(state.as_mut()).unwrap();

        let mut clone = state.clone_state();
        clone.core_mut().pos = 99.0;
        clone
            .as_any_mut()
            .downcast_mut::<TestState>()
            .unwrap()
            .visited
            .push(42);

        assert_eq!(state.core().pos, 0.0);
        assert_eq!(visited(state.as_ref()), [0, 1]);
    }
}
