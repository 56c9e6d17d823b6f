//! Kernel registries and the search that picks one entry out of them.

use core::mem;

use crate::args::{GemmArgs, GemmMethod, WeightFormat};
use crate::kern::Strategy;
use crate::matrix::Scalar;

pub type SupportPredicate = Box<dyn Fn(&GemmArgs) -> bool + Send + Sync>;
pub type CycleEstimator = Box<dyn Fn(&GemmArgs) -> u64 + Send + Sync>;
pub type Instantiator<TIn, TOut> = Box<dyn Fn(&GemmArgs) -> Box<dyn Strategy<TIn, TOut>> + Send + Sync>;

/// One candidate kernel family for a given operand/result type pair.
pub struct GemmImplementation<TIn: Scalar, TOut: Scalar> {
    method: GemmMethod,
    name: &'static str,
    weight_format: WeightFormat,
    is_supported: Option<SupportPredicate>,
    cycle_estimate: Option<CycleEstimator>,
    instantiate: Option<Instantiator<TIn, TOut>>,
}

impl<TIn: Scalar, TOut: Scalar> GemmImplementation<TIn, TOut> {
    pub fn new<F>(method: GemmMethod, name: &'static str, instantiate: F) -> GemmImplementation<TIn, TOut>
        where F: Fn(&GemmArgs) -> Box<dyn Strategy<TIn, TOut>> + Send + Sync + 'static
    {
        GemmImplementation {
            method: method,
            name: name,
            weight_format: WeightFormat::Unspecified,
            is_supported: None,
            cycle_estimate: None,
            instantiate: Some(Box::new(instantiate)),
        }
    }

    /// End-of-list marker.
    pub fn sentinel() -> GemmImplementation<TIn, TOut> {
        GemmImplementation {
            method: GemmMethod::Default,
            name: "",
            weight_format: WeightFormat::Unspecified,
            is_supported: None,
            cycle_estimate: None,
            instantiate: None,
        }
    }

    pub fn supported_if<F>(mut self, f: F) -> GemmImplementation<TIn, TOut>
        where F: Fn(&GemmArgs) -> bool + Send + Sync + 'static
    {
        self.is_supported = Some(Box::new(f));
        self
    }

    pub fn cycle_estimate<F>(mut self, f: F) -> GemmImplementation<TIn, TOut>
        where F: Fn(&GemmArgs) -> u64 + Send + Sync + 'static
    {
        self.cycle_estimate = Some(Box::new(f));
        self
    }

    pub fn weight_format(mut self, wf: WeightFormat) -> GemmImplementation<TIn, TOut> {
        self.weight_format = wf;
        self
    }

    #[inline] pub fn method(&self) -> GemmMethod { self.method }
    #[inline] pub fn name(&self) -> &'static str { self.name }

    pub fn is_sentinel(&self) -> bool {
        self.method == GemmMethod::Default && self.instantiate.is_none()
    }

    /// Weight format with vector-length relative layouts made concrete for this CPU.
    pub fn resolved_weight_format(&self, args: &GemmArgs) -> WeightFormat {
        self.weight_format.resolve(args.ci.vector_length_bytes(), mem::size_of::<TIn>())
    }

    /// The entry's own predicate, plus the fixed-format handshake.
    pub fn do_is_supported(&self, args: &GemmArgs) -> bool {
        if let Some(ref pred) = self.is_supported {
            if !pred(args) {
                return false;
            }
        }
        let wf = self.resolved_weight_format(args);
        if !args.fixed_format {
            // A plain problem never gets a kernel that expects pre-reshaped weights.
            return wf == WeightFormat::Unspecified;
        }
        if wf == WeightFormat::Unspecified {
            return false;
        }
        match args.cfg {
            None => true,
            Some(ref cfg) => match cfg.weight_format {
                WeightFormat::Any | WeightFormat::Unspecified => true,
                requested => requested.resolve(args.ci.vector_length_bytes(), mem::size_of::<TIn>()) == wf,
            },
        }
    }

    /// Estimated cycles. Entries without an estimator report 0, which forces their selection.
    pub fn do_cycle_estimate(&self, args: &GemmArgs) -> u64 {
        match self.cycle_estimate {
            Some(ref f) => f(args),
            None => 0,
        }
    }

    pub fn do_instantiate(&self, args: &GemmArgs) -> Option<Box<dyn Strategy<TIn, TOut>>> {
        self.instantiate.as_ref().map(|f| f(args))
    }

    /// Weight format, method and name filter requested by the caller's config.
    fn matches_config(&self, args: &GemmArgs) -> bool {
        let cfg = match args.cfg {
            Some(ref cfg) => cfg,
            None => return true,
        };
        match cfg.weight_format {
            WeightFormat::Unspecified | WeightFormat::Any => {}
            requested => {
                let requested = requested.resolve(args.ci.vector_length_bytes(), mem::size_of::<TIn>());
                if requested != self.resolved_weight_format(args) {
                    return false;
                }
            }
        }
        if cfg.method != GemmMethod::Default && cfg.method != self.method {
            return false;
        }
        if !cfg.filter.is_empty() && !self.name.contains(cfg.filter.as_str()) {
            return false;
        }
        true
    }
}

/// Ordered, immutable list of implementations for one type pair.
pub struct Registry<TIn: Scalar, TOut: Scalar> {
    entries: Vec<GemmImplementation<TIn, TOut>>,
}

impl<TIn: Scalar, TOut: Scalar> Registry<TIn, TOut> {
    /// Everything after the first sentinel is dropped.
    pub fn new(mut entries: Vec<GemmImplementation<TIn, TOut>>) -> Registry<TIn, TOut> {
        if let Some(end) = entries.iter().position(|e| e.is_sentinel()) {
            entries.truncate(end);
        }
        Registry { entries: entries }
    }

    pub fn iter(&self) -> ::core::slice::Iter<GemmImplementation<TIn, TOut>> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Operand types that own a process-wide registry producing `TOut` results.
pub trait GemmImplementationList<TOut: Scalar>: Scalar + Sized {
    fn implementation_list() -> &'static Registry<Self, TOut>;
}

/// Pick the entry to instantiate for `args`.
///
/// Entries are scanned in declaration order. The first supported entry with a
/// zero estimate wins outright; otherwise the strictly cheapest one does, so
/// equal estimates keep the earlier entry.
pub fn find_implementation<'r, TIn: Scalar, TOut: Scalar>(args: &GemmArgs, registry: &'r Registry<TIn, TOut>)
    -> Option<&'r GemmImplementation<TIn, TOut>>
{
    let mut best: Option<(&'r GemmImplementation<TIn, TOut>, u64)> = None;

    for entry in registry.iter() {
        if !entry.do_is_supported(args) || !entry.matches_config(args) {
            continue;
        }

        let cycles = entry.do_cycle_estimate(args);
        if cycles == 0 {
            debug!("selected {} ({}), forced", entry.name, entry.method);
            return Some(entry);
        }

        match best {
            Some((_, best_cycles)) if cycles >= best_cycles => {}
            _ => best = Some((entry, cycles)),
        }
    }

    if let Some((entry, cycles)) = best {
        debug!("selected {} ({}), estimate {} cycles", entry.name, entry.method, cycles);
    }
    best.map(|(entry, _)| entry)
}

/// Diagnostic description of one registry entry.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct KernelDescription {
    pub method: GemmMethod,
    pub name: String,
    pub is_default: bool,
    pub cycle_estimate: u64,
}

/// Every entry that passes all filters, flagging the one `find_implementation` picks.
pub fn compatible_kernels<TIn: Scalar, TOut: Scalar>(args: &GemmArgs, registry: &Registry<TIn, TOut>)
    -> Vec<KernelDescription>
{
    let chosen = find_implementation(args, registry).map(|e| e as *const GemmImplementation<TIn, TOut>);
    registry.iter()
        .filter(|e| e.do_is_supported(args) && e.matches_config(args))
        .map(|e| KernelDescription {
            method: e.method,
            name: e.name.to_string(),
            is_default: chosen == Some(e as *const _),
            cycle_estimate: e.do_cycle_estimate(args),
        })
        .collect()
}

pub fn get_compatible_kernels<TIn, TOut>(args: &GemmArgs) -> Vec<KernelDescription>
    where TIn: GemmImplementationList<TOut>, TOut: Scalar
{
    compatible_kernels(args, TIn::implementation_list())
}

pub fn get_gemm_method<TIn, TOut>(args: &GemmArgs) -> Option<KernelDescription>
    where TIn: GemmImplementationList<TOut>, TOut: Scalar
{
    find_implementation(args, TIn::implementation_list()).map(|e| KernelDescription {
        method: e.method,
        name: e.name.to_string(),
        is_default: true,
        cycle_estimate: e.do_cycle_estimate(args),
    })
}
