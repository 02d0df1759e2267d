//! Meta-variable extension
//!
//! When a method body is synthesized for interception, a handful of reserved
//! names compile to fixed special forms instead of resolving as ordinary
//! identifiers. The base pipeline knows nothing about them: a [`MetaResolver`]
//! strategy is injected for one unit and consulted at exactly three seams —
//! identifier classification, call classification and cast classification —
//! by both the type checker and the code generator, which keeps the two
//! passes consistent by construction.
//!
//! Positional parameters (`$0`..`$n`) are not classified here; the session
//! pre-registers them as declarators with their real slots, so they reach the
//! pipeline as plain variables.

use std::sync::Arc;

use crate::ast::{Expr, Location};
use crate::codegen::CodeGen;
use crate::error::Result;
use crate::typeck::TypeChecker;
use crate::types::TypeDesc;

/// Special form of a reserved name in expression position
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetaForm {
    /// `$args` — boxed `Object[]` snapshot of the parameters
    ParamArray,
    /// `$$` — parameter spread, legal only as a sole call argument
    ParamList,
    /// `$_` — the return-value placeholder
    ResultValue,
    /// `$class` — class object of the receiver's declared type
    ClassObject,
    /// `$sig` — `Class[]` of the static signature
    SigArray,
    /// `$type` — class object of the return type
    TypeObject,
}

/// Special form of a reserved call name
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetaCall {
    /// The pluggable proceed call
    Proceed,
    /// `$cflow(a.b)` call-depth counter lookup
    Cflow,
}

/// Special form of a reserved cast name
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetaCast {
    /// `($r)` — cast/convert to the return type, unboxing if needed
    ReturnCast,
    /// `($w)` — box a primitive into its wrapper
    WrapperCast,
}

/// Strategy that emits the proceed call
///
/// The checker asks for the result type before arguments are generated; the
/// generator then delegates the whole call emission, with the arguments
/// already type-annotated.
pub trait ProceedHandler {
    fn check(
        &self,
        tc: &mut TypeChecker<'_>,
        args: &mut [Expr],
        loc: Location,
    ) -> Result<TypeDesc>;

    fn emit(&self, gen: &mut CodeGen<'_>, args: &[Expr], loc: Location) -> Result<()>;
}

/// Where `$cflow` counters live: a static field `cflow$a$b` of type
/// `counter_class` on `owner`, with an `int value()` accessor
#[derive(Debug, Clone)]
pub struct CflowBinding {
    pub owner: String,
    pub counter_class: String,
}

/// Injectable special-identifier resolver, supplied before compiling a unit
pub trait MetaResolver {
    fn classify_ident(&self, name: &str) -> Option<MetaForm>;
    fn classify_call(&self, name: &str) -> Option<MetaCall>;
    fn classify_cast(&self, class_name: &str) -> Option<MetaCast>;
    fn proceed_handler(&self) -> Option<&Arc<dyn ProceedHandler>>;
    fn cflow(&self) -> Option<&CflowBinding>;
}

/// The standard bindings used when synthesizing interceptor bodies
pub struct MetaBindings {
    pub param_array_name: String,
    pub param_list_name: String,
    pub result_name: String,
    pub return_cast_name: String,
    pub wrapper_cast_name: String,
    pub class_object_name: String,
    pub sig_array_name: String,
    pub type_object_name: String,
    pub cflow_call_name: String,
    pub proceed_name: Option<String>,
    pub proceed: Option<Arc<dyn ProceedHandler>>,
    pub cflow: Option<CflowBinding>,
}

impl MetaBindings {
    /// The conventional `$`-names
    pub fn standard() -> Self {
        Self {
            param_array_name: "$args".to_string(),
            param_list_name: "$$".to_string(),
            result_name: "$_".to_string(),
            return_cast_name: "$r".to_string(),
            wrapper_cast_name: "$w".to_string(),
            class_object_name: "$class".to_string(),
            sig_array_name: "$sig".to_string(),
            type_object_name: "$type".to_string(),
            cflow_call_name: "$cflow".to_string(),
            proceed_name: None,
            proceed: None,
            cflow: None,
        }
    }

    pub fn with_proceed(mut self, name: impl Into<String>, handler: Arc<dyn ProceedHandler>) -> Self {
        self.proceed_name = Some(name.into());
        self.proceed = Some(handler);
        self
    }

    pub fn with_cflow(mut self, binding: CflowBinding) -> Self {
        self.cflow = Some(binding);
        self
    }
}

impl MetaResolver for MetaBindings {
    fn classify_ident(&self, name: &str) -> Option<MetaForm> {
        if name == self.param_array_name {
            Some(MetaForm::ParamArray)
        } else if name == self.param_list_name {
            Some(MetaForm::ParamList)
        } else if name == self.result_name {
            Some(MetaForm::ResultValue)
        } else if name == self.class_object_name {
            Some(MetaForm::ClassObject)
        } else if name == self.sig_array_name {
            Some(MetaForm::SigArray)
        } else if name == self.type_object_name {
            Some(MetaForm::TypeObject)
        } else {
            None
        }
    }

    fn classify_call(&self, name: &str) -> Option<MetaCall> {
        if self.proceed_name.as_deref() == Some(name) {
            Some(MetaCall::Proceed)
        } else if name == self.cflow_call_name {
            Some(MetaCall::Cflow)
        } else {
            None
        }
    }

    fn classify_cast(&self, class_name: &str) -> Option<MetaCast> {
        if class_name == self.return_cast_name {
            Some(MetaCast::ReturnCast)
        } else if class_name == self.wrapper_cast_name {
            Some(MetaCast::WrapperCast)
        } else {
            None
        }
    }

    fn proceed_handler(&self) -> Option<&Arc<dyn ProceedHandler>> {
        self.proceed.as_ref()
    }

    fn cflow(&self) -> Option<&CflowBinding> {
        self.cflow.as_ref()
    }
}
