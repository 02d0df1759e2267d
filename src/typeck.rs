//! Type checking and lowering
//!
//! One pass over the parsed tree: every expression gets its type triple,
//! dotted names are classified, overloads are resolved, constants are folded,
//! and the forms the generator wants pre-digested (string concatenation,
//! meta variables, parameter unpacking) are rewritten into lowered node
//! kinds. Lowered nodes own their original operand subtrees, so re-checking
//! an already annotated node is a no-op and the generator never depends on
//! hidden mutation order.

use std::mem;
use std::sync::Arc;

use crate::ast::{BinOp, CallTarget, Expr, ExprKind, Location, Stmt, UnOp};
use crate::error::{Error, Result};
use crate::metadata::{ClassDesc, MethodDesc};
use crate::meta::{MetaCall, MetaCast, MetaForm, MetaResolver};
use crate::resolver::{FieldRef, MemberResolver, PathTarget};
use crate::symtab::{DeclId, Declarator};
use crate::types::{self, binary_promotion, widens_to, wrapper_class, BaseType, TypeDesc};

const CLASS_CLASS: &str = "java.lang.Class";

/// Annotates and lowers one parsed unit
pub struct TypeChecker<'a> {
    resolver: &'a MemberResolver,
    current_class: Arc<ClassDesc>,
    current_method: Option<&'a MethodDesc>,
    meta: Option<&'a dyn MetaResolver>,
    decls: &'a mut Vec<Declarator>,
    param_ids: &'a [DeclId],
    return_type: TypeDesc,
    is_static: bool,
    result_used: bool,
}

impl<'a> TypeChecker<'a> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        resolver: &'a MemberResolver,
        current_class: Arc<ClassDesc>,
        current_method: Option<&'a MethodDesc>,
        meta: Option<&'a dyn MetaResolver>,
        decls: &'a mut Vec<Declarator>,
        param_ids: &'a [DeclId],
        return_type: TypeDesc,
        is_static: bool,
    ) -> Self {
        Self {
            resolver,
            current_class,
            current_method,
            meta,
            decls,
            param_ids,
            return_type,
            is_static,
            result_used: false,
        }
    }

    /// Whether the unit referenced the result placeholder
    pub fn result_used(&self) -> bool {
        self.result_used
    }

    pub fn resolver(&self) -> &MemberResolver {
        self.resolver
    }

    pub fn return_type(&self) -> &TypeDesc {
        &self.return_type
    }

    pub fn param_ids(&self) -> &[DeclId] {
        self.param_ids
    }

    pub fn decl_type(&self, id: DeclId) -> &TypeDesc {
        &self.decls[id.0].ty
    }

    pub fn check(&mut self, stmts: &mut [Stmt]) -> Result<()> {
        for s in stmts.iter_mut() {
            self.check_stmt(s)?;
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Statements
    // ------------------------------------------------------------------

    fn check_stmt(&mut self, s: &mut Stmt) -> Result<()> {
        match s {
            Stmt::Block(stmts) => self.check(stmts),
            Stmt::Expr(e) => self.check_expr(e).map(|_| ()),
            Stmt::Decl { decls, loc } => {
                let loc = *loc;
                for (id, init) in decls.iter_mut() {
                    let declared = self.resolver.resolve_type(&self.decls[id.0].ty, loc)?;
                    self.decls[id.0].ty = declared.clone();
                    if let Some(init) = init {
                        let vt = self.check_expr(init)?;
                        self.check_assignable(&vt, &declared, const_int(&init.kind), init.loc)?;
                    }
                }
                Ok(())
            }
            Stmt::If { cond, then_branch, else_branch } => {
                self.check_condition(cond)?;
                self.check_stmt(then_branch)?;
                if let Some(e) = else_branch {
                    self.check_stmt(e)?;
                }
                Ok(())
            }
            Stmt::While { cond, body } | Stmt::DoWhile { body, cond } => {
                self.check_condition(cond)?;
                self.check_stmt(body)
            }
            Stmt::For { init, cond, update, body } => {
                self.check(init)?;
                if let Some(c) = cond {
                    self.check_condition(c)?;
                }
                for u in update.iter_mut() {
                    self.check_expr(u)?;
                }
                self.check_stmt(body)
            }
            Stmt::Switch { selector, arms, loc } => {
                let st = self.check_expr(selector)?;
                if !is_int_category(&st) {
                    return Err(Error::compile(
                        *loc,
                        format!("bad type for switch selector: {}", st.display()),
                    ));
                }
                let mut seen = Vec::new();
                let mut has_default = false;
                for arm in arms.iter_mut() {
                    match &mut arm.value {
                        Some(v) => {
                            self.check_expr(v)?;
                            let value = const_int(&v.kind).ok_or_else(|| {
                                Error::compile(arm.loc, "constant expression required in case label")
                            })?;
                            if seen.contains(&value) {
                                return Err(Error::compile(
                                    arm.loc,
                                    format!("duplicate case label {}", value),
                                ));
                            }
                            seen.push(value);
                        }
                        None => {
                            if has_default {
                                return Err(Error::compile(arm.loc, "duplicate default label"));
                            }
                            has_default = true;
                        }
                    }
                    self.check(&mut arm.body)?;
                }
                Ok(())
            }
            Stmt::Try { body, catches, finally } => {
                self.check(body)?;
                for clause in catches.iter_mut() {
                    let class = self.resolver.resolve_class(&clause.class_name, clause.loc)?;
                    clause.class_name = class.name.clone();
                    self.decls[clause.decl.0].ty = TypeDesc::class(class.name.clone());
                    self.check(&mut clause.body)?;
                }
                if let Some(f) = finally {
                    self.check(f)?;
                }
                Ok(())
            }
            Stmt::Synchronized { monitor, body } => {
                let mt = self.check_expr(monitor)?;
                if !mt.is_reference() {
                    return Err(Error::compile(
                        monitor.loc,
                        "synchronized needs an object reference",
                    ));
                }
                self.check(body)
            }
            Stmt::Return { value, loc } => match (value, self.return_type.is_void()) {
                (None, true) => Ok(()),
                (None, false) => Err(Error::compile(*loc, "missing return value")),
                (Some(_), true) => {
                    Err(Error::compile(*loc, "cannot return a value from a void method"))
                }
                (Some(v), false) => {
                    let vt = self.check_expr(v)?;
                    let ret = self.return_type.clone();
                    self.check_assignable(&vt, &ret, const_int(&v.kind), v.loc)
                }
            },
            Stmt::Throw(e) => {
                let ty = self.check_expr(e)?;
                if !ty.is_reference() {
                    return Err(Error::compile(e.loc, "throw needs a throwable object"));
                }
                Ok(())
            }
            Stmt::Labeled { body, .. } => self.check_stmt(body),
            Stmt::Break { .. } | Stmt::Continue { .. } | Stmt::Empty => Ok(()),
        }
    }

    fn check_condition(&mut self, e: &mut Expr) -> Result<()> {
        let ty = self.check_expr(e)?;
        if !ty.is_boolean() {
            return Err(Error::compile(
                e.loc,
                format!("bad type for a condition: {}", ty.display()),
            ));
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Expressions
    // ------------------------------------------------------------------

    /// Annotate one expression, rewriting it in place where a lowered form
    /// replaces the source form. Re-checking an annotated node is a no-op.
    pub fn check_expr(&mut self, e: &mut Expr) -> Result<TypeDesc> {
        if let Some(ty) = &e.ty {
            return Ok(ty.clone());
        }
        let ty = match &e.kind {
            ExprKind::IntLit(_) => TypeDesc::int(),
            ExprKind::LongLit(_) => TypeDesc::primitive(BaseType::Long),
            ExprKind::FloatLit(_) => TypeDesc::primitive(BaseType::Float),
            ExprKind::DoubleLit(_) => TypeDesc::primitive(BaseType::Double),
            ExprKind::CharLit(_) => TypeDesc::primitive(BaseType::Char),
            ExprKind::BoolLit(_) => TypeDesc::primitive(BaseType::Boolean),
            ExprKind::StringLit(_) => TypeDesc::string(),
            ExprKind::NullLit => TypeDesc::null(),
            ExprKind::This => {
                if self.is_static {
                    return Err(Error::compile(e.loc, "no `this` in a static context"));
                }
                TypeDesc::class(self.current_class.name.clone())
            }
            ExprKind::Variable(id) => self.decls[id.0].ty.clone(),
            ExprKind::Name(_) => self.check_name(e)?,
            ExprKind::FieldAccess { .. } => self.check_field_access(e)?,
            ExprKind::StaticField { .. } => self.check_static_field(e)?,
            ExprKind::ArrayLength(_) | ExprKind::Index { .. } => self.check_indexing(e)?,
            ExprKind::Call { .. } => self.check_call(e)?,
            ExprKind::New { .. } => self.check_new(e)?,
            ExprKind::NewArray { .. } => self.check_new_array(e)?,
            ExprKind::Unary { .. } => self.check_unary(e)?,
            ExprKind::IncDec { .. } => self.check_incdec(e)?,
            ExprKind::Binary { .. } => self.check_binary(e)?,
            ExprKind::Assign { .. } => self.check_assign(e)?,
            ExprKind::Conditional { .. } => self.check_conditional(e)?,
            ExprKind::Cast { .. } => self.check_cast(e)?,
            ExprKind::InstanceOf { .. } => self.check_instanceof(e)?,
            ExprKind::StringConcat { .. }
            | ExprKind::Meta(_)
            | ExprKind::AssignParams { .. }
            | ExprKind::ProceedCall { .. }
            | ExprKind::CflowLookup { .. } => {
                return Err(Error::internal("lowered node reached the checker untyped"))
            }
        };
        e.ty = Some(ty.clone());
        Ok(ty)
    }

    /// Classify an unresolved dotted name: a reserved meta name, a field
    /// chain rooted at the compiled class, or a static member behind a
    /// class-name prefix
    fn check_name(&mut self, e: &mut Expr) -> Result<TypeDesc> {
        let path = match &e.kind {
            ExprKind::Name(p) => p.clone(),
            _ => return Err(Error::internal("check_name on a non-name node")),
        };
        let loc = e.loc;
        if path.len() == 1 {
            if let Some(form) = self.meta.and_then(|m| m.classify_ident(&path[0])) {
                let ty = self.meta_form_type(form, loc)?;
                e.kind = ExprKind::Meta(form);
                return Ok(ty);
            }
        }
        match self.resolve_name_expr(&path, loc)? {
            Some(resolved) => {
                let ty = resolved
                    .ty
                    .clone()
                    .ok_or_else(|| Error::internal("resolved name chain lost its type"))?;
                *e = resolved;
                Ok(ty)
            }
            None => {
                let joined = path.join(".");
                if self.resolver.try_resolve_class(&joined).is_some() {
                    Err(Error::compile(
                        loc,
                        format!("class `{}` used where a value is expected", joined),
                    ))
                } else {
                    Err(Error::compile(loc, format!("no such field or variable `{}`", joined)))
                }
            }
        }
    }

    fn meta_form_type(&mut self, form: MetaForm, loc: Location) -> Result<TypeDesc> {
        match form {
            MetaForm::ParamArray => Ok(TypeDesc::array_of(TypeDesc::object(), 1)),
            MetaForm::ParamList => Err(Error::compile(
                loc,
                "the parameter spread is only usable as the sole call argument",
            )),
            MetaForm::ResultValue => {
                if self.return_type.is_void() {
                    return Err(Error::compile(loc, "no result value in a void method"));
                }
                self.result_used = true;
                Ok(self.return_type.clone())
            }
            MetaForm::ClassObject | MetaForm::TypeObject => Ok(TypeDesc::class(CLASS_CLASS)),
            MetaForm::SigArray => Ok(TypeDesc::array_of(TypeDesc::class(CLASS_CLASS), 1)),
        }
    }

    /// Turn a dotted name into a field access chain, or `None` when no field
    /// interpretation exists
    fn resolve_name_expr(&mut self, path: &[String], loc: Location) -> Result<Option<Expr>> {
        let (mut expr, rest) = match self.resolver.classify_path(&self.current_class, path) {
            PathTarget::FieldChain { head } => {
                (self.field_head(head, &path[0], loc)?, &path[1..])
            }
            PathTarget::StaticMember { split, head } => {
                self.check_member_access(head.access, &head.class, &path[split], loc)?;
                let ty = head.ty.clone();
                let mut head_expr = Expr::new(
                    ExprKind::StaticField {
                        class: head.class.clone(),
                        name: path[split].clone(),
                        resolved: Some(head),
                    },
                    loc,
                );
                head_expr.ty = Some(ty);
                (head_expr, &path[split + 1..])
            }
            PathTarget::Unresolved => return Ok(None),
        };
        for name in rest {
            expr = self.append_field(expr, name, loc)?;
        }
        Ok(Some(expr))
    }

    /// Build the access node for a field of the compiled class itself
    fn field_head(&mut self, head: FieldRef, name: &str, loc: Location) -> Result<Expr> {
        self.check_member_access(head.access, &head.class, name, loc)?;
        let ty = head.ty.clone();
        let kind = if head.is_static() {
            ExprKind::StaticField {
                class: head.class.clone(),
                name: name.to_string(),
                resolved: Some(head),
            }
        } else {
            if self.is_static {
                return Err(Error::compile(
                    loc,
                    format!("instance field `{}` referenced from a static context", name),
                ));
            }
            let mut this = Expr::new(ExprKind::This, loc);
            this.ty = Some(TypeDesc::class(self.current_class.name.clone()));
            ExprKind::FieldAccess {
                target: Box::new(this),
                name: name.to_string(),
                resolved: Some(head),
            }
        };
        let mut e = Expr::new(kind, loc);
        e.ty = Some(ty);
        Ok(e)
    }

    /// Append one `.name` step to an already typed chain
    fn append_field(&mut self, target: Expr, name: &str, loc: Location) -> Result<Expr> {
        let tty = target
            .ty
            .clone()
            .ok_or_else(|| Error::internal("untyped chain target"))?;
        if tty.dims > 0 && name == "length" {
            let mut e = Expr::new(ExprKind::ArrayLength(Box::new(target)), loc);
            e.ty = Some(TypeDesc::int());
            return Ok(e);
        }
        let class = self.class_of(&tty, loc)?;
        let field = self
            .resolver
            .lookup_field(&class, name)
            .ok_or_else(|| {
                Error::compile(loc, format!("no such field `{}` in {}", name, class.name))
            })?;
        self.check_member_access(field.access, &field.class, name, loc)?;
        let ty = field.ty.clone();
        // a static field reached through an instance keeps the receiver
        // expression; it is evaluated and discarded during generation
        let kind = ExprKind::FieldAccess {
            target: Box::new(target),
            name: name.to_string(),
            resolved: Some(field),
        };
        let mut e = Expr::new(kind, loc);
        e.ty = Some(ty);
        Ok(e)
    }

    fn check_field_access(&mut self, e: &mut Expr) -> Result<TypeDesc> {
        let loc = e.loc;
        let (target, name) = match mem::replace(&mut e.kind, ExprKind::NullLit) {
            ExprKind::FieldAccess { target, name, .. } => (target, name),
            _ => return Err(Error::internal("check_field_access on a non-field node")),
        };
        let mut target = *target;
        self.check_expr(&mut target)?;
        let rebuilt = self.append_field(target, &name, loc)?;
        let ty = rebuilt
            .ty
            .clone()
            .ok_or_else(|| Error::internal("untyped field access"))?;
        e.kind = rebuilt.kind;
        Ok(ty)
    }

    fn check_static_field(&mut self, e: &mut Expr) -> Result<TypeDesc> {
        let loc = e.loc;
        let (class_name, name) = match &e.kind {
            ExprKind::StaticField { class, name, .. } => (class.clone(), name.clone()),
            _ => return Err(Error::internal("check_static_field on a non-field node")),
        };
        let class = self.resolver.resolve_class(&class_name, loc)?;
        let field = self
            .resolver
            .lookup_field(&class, &name)
            .ok_or_else(|| {
                Error::compile(loc, format!("no such field `{}` in {}", name, class.name))
            })?;
        if !field.is_static() {
            return Err(Error::compile(
                loc,
                format!("`{}` is not a static field of {}", name, class.name),
            ));
        }
        self.check_member_access(field.access, &field.class, &name, loc)?;
        let ty = field.ty.clone();
        e.kind = ExprKind::StaticField {
            class: field.class.clone(),
            name,
            resolved: Some(field),
        };
        Ok(ty)
    }

    fn check_indexing(&mut self, e: &mut Expr) -> Result<TypeDesc> {
        match &mut e.kind {
            ExprKind::ArrayLength(target) => {
                let ty = self.check_expr(target)?;
                if ty.dims == 0 {
                    return Err(Error::compile(e.loc, "array length on a non-array"));
                }
                Ok(TypeDesc::int())
            }
            ExprKind::Index { array, index } => {
                let at = self.check_expr(array)?;
                let elem = at.element().ok_or_else(|| {
                    Error::compile(array.loc, format!("not an array type: {}", at.display()))
                })?;
                let it = self.check_expr(index)?;
                if !is_int_category(&it) {
                    return Err(Error::compile(
                        index.loc,
                        format!("bad type for an array index: {}", it.display()),
                    ));
                }
                Ok(elem)
            }
            _ => Err(Error::internal("check_indexing on a non-index node")),
        }
    }

    // ------------------------------------------------------------------
    // Calls
    // ------------------------------------------------------------------

    fn check_call(&mut self, e: &mut Expr) -> Result<TypeDesc> {
        let loc = e.loc;
        let (target, name, mut args) = match mem::replace(&mut e.kind, ExprKind::NullLit) {
            ExprKind::Call { target, name, args, .. } => (target, name, args),
            _ => return Err(Error::internal("check_call on a non-call node")),
        };

        // reserved call names bind before any member lookup
        if matches!(target, CallTarget::Implicit) {
            match self.meta.and_then(|m| m.classify_call(&name)) {
                Some(MetaCall::Proceed) => {
                    self.expand_param_spread(&mut args, loc);
                    let handler = self
                        .meta
                        .and_then(|m| m.proceed_handler())
                        .cloned()
                        .ok_or_else(|| {
                            Error::compile(loc, format!("`{}` is not available here", name))
                        })?;
                    let ty = handler.check(self, &mut args, loc)?;
                    e.kind = ExprKind::ProceedCall { args };
                    return Ok(ty);
                }
                Some(MetaCall::Cflow) => {
                    let key = match args.as_slice() {
                        [Expr { kind: ExprKind::Name(path), .. }] => path.join("."),
                        _ => {
                            return Err(Error::compile(
                                loc,
                                format!("`{}` needs one qualified name argument", name),
                            ))
                        }
                    };
                    if self.meta.and_then(|m| m.cflow()).is_none() {
                        return Err(Error::compile(
                            loc,
                            format!("no context counter is bound for `{}`", key),
                        ));
                    }
                    e.kind = ExprKind::CflowLookup { key };
                    return Ok(TypeDesc::int());
                }
                None => {}
            }
        }

        self.expand_param_spread(&mut args, loc);
        let mut arg_types = Vec::with_capacity(args.len());
        for a in args.iter_mut() {
            arg_types.push(self.check_expr(a)?);
        }

        let (target, class) = self.resolve_call_target(target, loc)?;

        let current = self
            .current_method
            .map(|m| (self.current_class.name.as_str(), m));
        let method = self
            .resolver
            .lookup_method(&class, &name, &arg_types, current, loc)?
            .ok_or_else(|| {
                Error::compile(
                    loc,
                    format!(
                        "no matching method `{}({})` in {}",
                        name,
                        display_list(&arg_types),
                        class.name
                    ),
                )
            })?;

        if !method.is_static() {
            match &target {
                CallTarget::Implicit if self.is_static => {
                    return Err(Error::compile(
                        loc,
                        format!("instance method `{}` called from a static context", name),
                    ))
                }
                CallTarget::Class(c) => {
                    return Err(Error::compile(
                        loc,
                        format!("`{}` is not a static method of {}", name, c),
                    ))
                }
                _ => {}
            }
        }
        self.check_member_access(method.access, &method.class, &name, loc)?;

        let ret = method.ret.clone();
        e.kind = ExprKind::Call {
            target,
            name,
            args,
            resolved: Some(method),
        };
        Ok(ret)
    }

    /// Resolve the receiver part of a call to a concrete class, rewriting
    /// path receivers into field chains or class references
    fn resolve_call_target(
        &mut self,
        target: CallTarget,
        loc: Location,
    ) -> Result<(CallTarget, Arc<ClassDesc>)> {
        match target {
            CallTarget::Implicit => Ok((CallTarget::Implicit, self.current_class.clone())),
            CallTarget::Expr(mut recv) => {
                let ty = self.check_expr(&mut recv)?;
                let class = self.class_of(&ty, loc)?;
                Ok((CallTarget::Expr(recv), class))
            }
            CallTarget::Path(path) => {
                if let Some(recv) = self.resolve_name_expr(&path, loc)? {
                    let ty = recv
                        .ty
                        .clone()
                        .ok_or_else(|| Error::internal("untyped call receiver"))?;
                    let class = self.class_of(&ty, loc)?;
                    return Ok((CallTarget::Expr(Box::new(recv)), class));
                }
                let joined = path.join(".");
                let class = self.resolver.try_resolve_class(&joined).ok_or_else(|| {
                    Error::compile(loc, format!("no such field or class `{}`", joined))
                })?;
                Ok((CallTarget::Class(class.name.clone()), class))
            }
            CallTarget::Class(name) => {
                let class = self.resolver.resolve_class(&name, loc)?;
                Ok((CallTarget::Class(class.name.clone()), class))
            }
            CallTarget::Super => {
                if self.is_static {
                    return Err(Error::compile(loc, "no `super` in a static context"));
                }
                let sup = self
                    .current_class
                    .superclass
                    .clone()
                    .ok_or_else(|| Error::compile(loc, "the compiled class has no superclass"))?;
                let class = self.resolver.resolve_class(&sup, loc)?;
                Ok((CallTarget::Super, class))
            }
        }
    }

    /// `f($$)` becomes `f($1, ..., $n)`
    fn expand_param_spread(&mut self, args: &mut Vec<Expr>, loc: Location) {
        let is_spread = match args.as_slice() {
            [Expr { kind: ExprKind::Name(p), .. }] if p.len() == 1 => self
                .meta
                .and_then(|m| m.classify_ident(&p[0]))
                .map_or(false, |f| f == MetaForm::ParamList),
            _ => false,
        };
        if !is_spread {
            return;
        }
        args.clear();
        for id in self.param_ids {
            let mut v = Expr::new(ExprKind::Variable(*id), loc);
            v.ty = Some(self.decls[id.0].ty.clone());
            args.push(v);
        }
    }

    fn check_new(&mut self, e: &mut Expr) -> Result<TypeDesc> {
        let loc = e.loc;
        let (class_name, mut args) = match mem::replace(&mut e.kind, ExprKind::NullLit) {
            ExprKind::New { class_name, args, .. } => (class_name, args),
            _ => return Err(Error::internal("check_new on a non-new node")),
        };
        let class = self.resolver.resolve_class(&class_name, loc)?;
        if class.is_interface() {
            return Err(Error::compile(
                loc,
                format!("cannot instantiate interface {}", class.name),
            ));
        }
        if class.is_abstract() {
            return Err(Error::compile(
                loc,
                format!("cannot instantiate abstract class {}", class.name),
            ));
        }
        self.expand_param_spread(&mut args, loc);
        let mut arg_types = Vec::with_capacity(args.len());
        for a in args.iter_mut() {
            arg_types.push(self.check_expr(a)?);
        }
        let ctor = self
            .resolver
            .lookup_method(&class, "<init>", &arg_types, None, loc)?
            .ok_or_else(|| {
                Error::compile(
                    loc,
                    format!(
                        "no matching constructor `{}({})`",
                        class.name,
                        display_list(&arg_types)
                    ),
                )
            })?;
        self.check_member_access(ctor.access, &ctor.class, "<init>", loc)?;
        let ty = TypeDesc::class(class.name.clone());
        e.kind = ExprKind::New {
            class_name: class.name.clone(),
            args,
            resolved: Some(ctor),
        };
        Ok(ty)
    }

    fn check_new_array(&mut self, e: &mut Expr) -> Result<TypeDesc> {
        let loc = e.loc;
        let (elem, mut dim_exprs, extra_dims) = match mem::replace(&mut e.kind, ExprKind::NullLit) {
            ExprKind::NewArray { elem, dim_exprs, extra_dims } => (elem, dim_exprs, extra_dims),
            _ => return Err(Error::internal("check_new_array on a non-array node")),
        };
        let elem = self.resolver.resolve_type(&elem, loc)?;
        for d in dim_exprs.iter_mut() {
            let dt = self.check_expr(d)?;
            if !is_int_category(&dt) {
                return Err(Error::compile(
                    d.loc,
                    format!("bad type for an array size: {}", dt.display()),
                ));
            }
        }
        let total = dim_exprs.len() + extra_dims;
        let ty = TypeDesc::array_of(elem.clone(), total);
        e.kind = ExprKind::NewArray { elem, dim_exprs, extra_dims };
        Ok(ty)
    }

    // ------------------------------------------------------------------
    // Operators
    // ------------------------------------------------------------------

    fn check_unary(&mut self, e: &mut Expr) -> Result<TypeDesc> {
        let loc = e.loc;
        let (op, operand_ty) = match &mut e.kind {
            ExprKind::Unary { op, operand } => {
                let ty = self.check_expr(operand)?;
                (*op, ty)
            }
            _ => return Err(Error::internal("check_unary on a non-unary node")),
        };
        let ty = match op {
            UnOp::Neg => {
                if !operand_ty.is_numeric() {
                    return Err(Error::compile(
                        loc,
                        format!("bad operand type for `-`: {}", operand_ty.display()),
                    ));
                }
                TypeDesc::primitive(unary_promote(operand_ty.base))
            }
            UnOp::Not => {
                if !operand_ty.is_boolean() {
                    return Err(Error::compile(
                        loc,
                        format!("bad operand type for `!`: {}", operand_ty.display()),
                    ));
                }
                TypeDesc::primitive(BaseType::Boolean)
            }
            UnOp::BitNot => {
                if !is_integral(&operand_ty) {
                    return Err(Error::compile(
                        loc,
                        format!("bad operand type for `~`: {}", operand_ty.display()),
                    ));
                }
                TypeDesc::primitive(unary_promote(operand_ty.base))
            }
        };
        if let ExprKind::Unary { op, operand } = &e.kind {
            if let Some(folded) = fold_unary(*op, &operand.kind, ty.base) {
                e.kind = folded;
            }
        }
        Ok(ty)
    }

    fn check_incdec(&mut self, e: &mut Expr) -> Result<TypeDesc> {
        let loc = e.loc;
        match &mut e.kind {
            ExprKind::IncDec { target, .. } => {
                let ty = self.check_expr(target)?;
                if !is_lvalue(&target.kind) {
                    return Err(Error::compile(loc, "bad target for ++/--"));
                }
                if !ty.is_numeric() {
                    return Err(Error::compile(
                        loc,
                        format!("bad operand type for ++/--: {}", ty.display()),
                    ));
                }
                Ok(ty)
            }
            _ => Err(Error::internal("check_incdec on a non-incdec node")),
        }
    }

    fn check_binary(&mut self, e: &mut Expr) -> Result<TypeDesc> {
        let loc = e.loc;
        let (op, mut lhs, mut rhs) = match mem::replace(&mut e.kind, ExprKind::NullLit) {
            ExprKind::Binary { op, lhs, rhs } => (op, lhs, rhs),
            _ => return Err(Error::internal("check_binary on a non-binary node")),
        };
        let lt = self.check_expr(&mut lhs)?;
        let rt = self.check_expr(&mut rhs)?;

        // string `+` folds into buffer-append form, flattening chains into a
        // single piece list since `+` is left associative
        if op == BinOp::Add && (lt.is_string() || rt.is_string()) {
            if let (ExprKind::StringLit(a), ExprKind::StringLit(b)) = (&lhs.kind, &rhs.kind) {
                let merged = format!("{}{}", a, b);
                e.kind = ExprKind::StringLit(merged);
                return Ok(TypeDesc::string());
            }
            let lhs = *lhs;
            let mut pieces = match lhs.kind {
                ExprKind::StringConcat { pieces } => pieces,
                kind => vec![Expr { kind, loc: lhs.loc, ty: lhs.ty }],
            };
            pieces.push(*rhs);
            e.kind = ExprKind::StringConcat { pieces };
            return Ok(TypeDesc::string());
        }

        let ty = self.binary_result(op, &lt, &rt, loc)?;
        let fold_base = if op.is_comparison() && lt.is_numeric() && rt.is_numeric() {
            binary_promotion(lt.base, rt.base)
        } else if op.is_shift() {
            unary_promote(lt.base)
        } else {
            ty.base
        };
        if let Some(folded) = fold_binary(op, &lhs.kind, &rhs.kind, fold_base) {
            e.kind = folded;
        } else {
            e.kind = ExprKind::Binary { op, lhs, rhs };
        }
        Ok(ty)
    }

    fn binary_result(
        &self,
        op: BinOp,
        lt: &TypeDesc,
        rt: &TypeDesc,
        loc: Location,
    ) -> Result<TypeDesc> {
        use BinOp::*;
        let bad = || {
            Error::compile(
                loc,
                format!(
                    "bad operand types for the operator: {} and {}",
                    lt.display(),
                    rt.display()
                ),
            )
        };
        match op {
            AndAnd | OrOr => {
                if lt.is_boolean() && rt.is_boolean() {
                    Ok(TypeDesc::primitive(BaseType::Boolean))
                } else {
                    Err(bad())
                }
            }
            Eq | Ne => {
                let ok = (lt.is_numeric() && rt.is_numeric())
                    || (lt.is_boolean() && rt.is_boolean())
                    || (lt.is_reference() && rt.is_reference());
                if ok {
                    Ok(TypeDesc::primitive(BaseType::Boolean))
                } else {
                    Err(bad())
                }
            }
            Lt | Le | Gt | Ge => {
                if lt.is_numeric() && rt.is_numeric() {
                    Ok(TypeDesc::primitive(BaseType::Boolean))
                } else {
                    Err(bad())
                }
            }
            Shl | Shr | Ushr => {
                if is_integral(lt) && is_integral(rt) {
                    Ok(TypeDesc::primitive(unary_promote(lt.base)))
                } else {
                    Err(bad())
                }
            }
            BitAnd | BitOr | BitXor => {
                if lt.is_boolean() && rt.is_boolean() {
                    Ok(TypeDesc::primitive(BaseType::Boolean))
                } else if is_integral(lt) && is_integral(rt) {
                    Ok(TypeDesc::primitive(binary_promotion(lt.base, rt.base)))
                } else {
                    Err(bad())
                }
            }
            Add | Sub | Mul | Div | Rem => {
                if lt.is_numeric() && rt.is_numeric() {
                    Ok(TypeDesc::primitive(binary_promotion(lt.base, rt.base)))
                } else {
                    Err(bad())
                }
            }
        }
    }

    fn check_assign(&mut self, e: &mut Expr) -> Result<TypeDesc> {
        let loc = e.loc;
        let (op, mut target, mut value) = match mem::replace(&mut e.kind, ExprKind::NullLit) {
            ExprKind::Assign { op, target, value } => (op, target, value),
            _ => return Err(Error::internal("check_assign on a non-assign node")),
        };
        let tt = self.check_expr(&mut target)?;

        // `$args = e` unpacks an Object[] back into the parameter slots
        if let ExprKind::Meta(MetaForm::ParamArray) = &target.kind {
            if op.is_some() {
                return Err(Error::compile(loc, "compound assignment to the parameter array"));
            }
            let vt = self.check_expr(&mut value)?;
            let object_array = TypeDesc::array_of(TypeDesc::object(), 1);
            if !vt.is_null() && vt != object_array {
                return Err(Error::compile(
                    value.loc,
                    format!("cannot assign {} to the parameter array", vt.display()),
                ));
            }
            e.kind = ExprKind::AssignParams { value };
            return Ok(object_array);
        }
        if let ExprKind::Meta(form) = &target.kind {
            if *form != MetaForm::ResultValue {
                return Err(Error::compile(loc, "this reserved name is not assignable"));
            }
        } else if !is_lvalue(&target.kind) {
            return Err(Error::compile(loc, "bad target for assignment"));
        }

        let vt = self.check_expr(&mut value)?;

        // string `+=` stays a compound node; the generator re-reads the
        // target through its compound path so the access path is evaluated
        // once, and any value with a string conversion is acceptable
        if op == Some(BinOp::Add) && tt.is_string() {
            if vt.is_void() {
                return Err(Error::compile(value.loc, "cannot concatenate a void value"));
            }
            e.kind = ExprKind::Assign { op, target, value };
            return Ok(tt);
        }

        match op {
            None => self.check_assignable(&vt, &tt, const_int(&value.kind), value.loc)?,
            Some(op) => {
                // the compound result converts back to the target type, so
                // only operator validity is checked here
                self.binary_result(op, &tt, &vt, loc)?;
            }
        }
        e.kind = ExprKind::Assign { op, target, value };
        Ok(tt)
    }

    fn check_conditional(&mut self, e: &mut Expr) -> Result<TypeDesc> {
        match &mut e.kind {
            ExprKind::Conditional { cond, then_val, else_val } => {
                let ct = self.check_expr(cond)?;
                if !ct.is_boolean() {
                    return Err(Error::compile(
                        cond.loc,
                        format!("bad type for a condition: {}", ct.display()),
                    ));
                }
                let tt = self.check_expr(then_val)?;
                let et = self.check_expr(else_val)?;
                self.merge_types(&tt, &et, e.loc)
            }
            _ => Err(Error::internal("check_conditional on a non-conditional node")),
        }
    }

    fn merge_types(&self, a: &TypeDesc, b: &TypeDesc, loc: Location) -> Result<TypeDesc> {
        if a == b {
            return Ok(a.clone());
        }
        if a.is_numeric() && b.is_numeric() {
            return Ok(TypeDesc::primitive(binary_promotion(a.base, b.base)));
        }
        if a.is_null() && b.is_reference() {
            return Ok(b.clone());
        }
        if b.is_null() && a.is_reference() {
            return Ok(a.clone());
        }
        if a.is_reference() && b.is_reference() {
            if self.resolver.is_assignable_ref(a, b) {
                return Ok(b.clone());
            }
            if self.resolver.is_assignable_ref(b, a) {
                return Ok(a.clone());
            }
            return Ok(TypeDesc::object());
        }
        Err(Error::compile(
            loc,
            format!("incompatible branch types: {} and {}", a.display(), b.display()),
        ))
    }

    fn check_cast(&mut self, e: &mut Expr) -> Result<TypeDesc> {
        let loc = e.loc;
        let (to, mut expr) = match mem::replace(&mut e.kind, ExprKind::NullLit) {
            ExprKind::Cast { to, expr } => (to, expr),
            _ => return Err(Error::internal("check_cast on a non-cast node")),
        };

        // `($r)` and `($w)` parse as class casts and are rebound here; the
        // rewritten cast may legitimately cross the primitive/reference line
        if to.dims == 0 && to.base == BaseType::Class {
            let special = to
                .class_name
                .as_deref()
                .and_then(|n| self.meta.and_then(|m| m.classify_cast(n)));
            match special {
                Some(MetaCast::ReturnCast) => {
                    if self.return_type.is_void() {
                        return Err(Error::compile(loc, "no return type to cast to"));
                    }
                    self.check_expr(&mut expr)?;
                    let ret = self.return_type.clone();
                    e.kind = ExprKind::Cast { to: ret.clone(), expr };
                    return Ok(ret);
                }
                Some(MetaCast::WrapperCast) => {
                    let et = self.check_expr(&mut expr)?;
                    if !et.is_primitive() || et.is_void() {
                        return Err(Error::compile(
                            loc,
                            format!("cannot wrap a value of type {}", et.display()),
                        ));
                    }
                    let wrapper = wrapper_class(et.base)
                        .ok_or_else(|| Error::internal("primitive without a wrapper class"))?;
                    let wrapped = TypeDesc::class(wrapper);
                    e.kind = ExprKind::Cast { to: wrapped.clone(), expr };
                    return Ok(wrapped);
                }
                None => {}
            }
        }

        let to = self.resolver.resolve_type(&to, loc)?;
        let et = self.check_expr(&mut expr)?;
        let ok = if to.is_primitive() && et.is_primitive() {
            (to.is_numeric() && et.is_numeric()) || (to.is_boolean() && et.is_boolean())
        } else {
            to.is_reference() && (et.is_reference() || et.is_null())
        };
        if !ok {
            return Err(Error::compile(
                loc,
                format!("cannot cast {} to {}", et.display(), to.display()),
            ));
        }
        e.kind = ExprKind::Cast { to: to.clone(), expr };
        Ok(to)
    }

    fn check_instanceof(&mut self, e: &mut Expr) -> Result<TypeDesc> {
        let loc = e.loc;
        match &mut e.kind {
            ExprKind::InstanceOf { expr, ty } => {
                let et = self.check_expr(expr)?;
                if !et.is_reference() && !et.is_null() {
                    return Err(Error::compile(
                        loc,
                        format!("bad operand type for instanceof: {}", et.display()),
                    ));
                }
                let resolver = self.resolver;
                *ty = resolver.resolve_type(ty, loc)?;
                if !ty.is_reference() {
                    return Err(Error::compile(loc, "instanceof needs a reference type"));
                }
                Ok(TypeDesc::primitive(BaseType::Boolean))
            }
            _ => Err(Error::internal("check_instanceof on a non-instanceof node")),
        }
    }

    // ------------------------------------------------------------------
    // Shared rules
    // ------------------------------------------------------------------

    /// Assignment compatibility, with the constant-narrowing allowance for
    /// int literals stored into byte/short/char
    fn check_assignable(
        &self,
        from: &TypeDesc,
        to: &TypeDesc,
        const_value: Option<i32>,
        loc: Location,
    ) -> Result<()> {
        if from == to {
            return Ok(());
        }
        if from.is_null() && to.is_reference() {
            return Ok(());
        }
        if from.is_primitive() && to.is_primitive() && from.dims == 0 && to.dims == 0 {
            if widens_to(from.base, to.base) {
                return Ok(());
            }
            if let Some(v) = const_value {
                let fits = match to.base {
                    BaseType::Byte => i8::try_from(v).is_ok(),
                    BaseType::Short => i16::try_from(v).is_ok(),
                    BaseType::Char => u16::try_from(v).is_ok(),
                    _ => false,
                };
                if fits {
                    return Ok(());
                }
            }
        }
        if from.is_primitive() && to.is_reference() && to.dims == 0 {
            let boxed_ok = to.class_name.as_deref() == Some(types::OBJECT)
                || to.class_name.as_deref() == wrapper_class(from.base);
            if boxed_ok {
                return Ok(());
            }
        }
        if from.is_reference() && to.is_reference() && self.resolver.is_assignable_ref(from, to) {
            return Ok(());
        }
        Err(Error::compile(
            loc,
            format!(
                "incompatible types: {} cannot be converted to {}",
                from.display(),
                to.display()
            ),
        ))
    }

    /// Private members are reachable from the declaring class itself, or
    /// through a synthesized accessor when both classes share a top level
    fn check_member_access(
        &self,
        access: u16,
        owner: &str,
        what: &str,
        loc: Location,
    ) -> Result<()> {
        use crate::metadata::access as flags;
        if access & flags::PRIVATE != 0
            && owner != self.current_class.name
            && !self.resolver.lexically_related(owner, &self.current_class.name)
        {
            return Err(Error::compile(
                loc,
                format!("`{}` has private access in {}", what, owner),
            ));
        }
        Ok(())
    }

    fn class_of(&self, ty: &TypeDesc, loc: Location) -> Result<Arc<ClassDesc>> {
        if ty.is_null() {
            return Err(Error::compile(loc, "cannot dereference null"));
        }
        if ty.dims > 0 {
            // array values answer the Object protocol
            return self.resolver.resolve_class(types::OBJECT, loc);
        }
        match &ty.class_name {
            Some(name) => self.resolver.resolve_class(name, loc),
            None => Err(Error::compile(
                loc,
                format!("cannot dereference a value of type {}", ty.display()),
            )),
        }
    }
}

// ----------------------------------------------------------------------
// Small classification helpers
// ----------------------------------------------------------------------

fn is_lvalue(kind: &ExprKind) -> bool {
    matches!(
        kind,
        ExprKind::Variable(_)
            | ExprKind::FieldAccess { .. }
            | ExprKind::StaticField { .. }
            | ExprKind::Index { .. }
            | ExprKind::Meta(MetaForm::ResultValue)
    )
}

fn is_int_category(ty: &TypeDesc) -> bool {
    ty.dims == 0
        && matches!(
            ty.base,
            BaseType::Byte | BaseType::Short | BaseType::Char | BaseType::Int
        )
}

fn is_integral(ty: &TypeDesc) -> bool {
    is_int_category(ty) || (ty.dims == 0 && ty.base == BaseType::Long)
}

fn unary_promote(base: BaseType) -> BaseType {
    match base {
        BaseType::Byte | BaseType::Short | BaseType::Char => BaseType::Int,
        other => other,
    }
}

fn const_int(kind: &ExprKind) -> Option<i32> {
    match kind {
        ExprKind::IntLit(v) => Some(*v),
        ExprKind::CharLit(c) => Some(*c as i32),
        _ => None,
    }
}

fn const_long(kind: &ExprKind) -> Option<i64> {
    match kind {
        ExprKind::LongLit(v) => Some(*v),
        _ => const_int(kind).map(i64::from),
    }
}

fn const_float(kind: &ExprKind) -> Option<f32> {
    match kind {
        ExprKind::FloatLit(v) => Some(*v),
        _ => const_long(kind).map(|v| v as f32),
    }
}

fn const_double(kind: &ExprKind) -> Option<f64> {
    match kind {
        ExprKind::DoubleLit(v) => Some(*v),
        ExprKind::FloatLit(v) => Some(f64::from(*v)),
        _ => const_long(kind).map(|v| v as f64),
    }
}

fn fold_unary(op: UnOp, operand: &ExprKind, base: BaseType) -> Option<ExprKind> {
    match (op, base) {
        (UnOp::Not, _) => match operand {
            ExprKind::BoolLit(b) => Some(ExprKind::BoolLit(!b)),
            _ => None,
        },
        (UnOp::BitNot, BaseType::Int) => const_int(operand).map(|v| ExprKind::IntLit(!v)),
        (UnOp::BitNot, BaseType::Long) => const_long(operand).map(|v| ExprKind::LongLit(!v)),
        (UnOp::Neg, BaseType::Int) => const_int(operand).map(|v| ExprKind::IntLit(v.wrapping_neg())),
        (UnOp::Neg, BaseType::Long) => {
            const_long(operand).map(|v| ExprKind::LongLit(v.wrapping_neg()))
        }
        (UnOp::Neg, BaseType::Float) => const_float(operand).map(|v| ExprKind::FloatLit(-v)),
        (UnOp::Neg, BaseType::Double) => const_double(operand).map(|v| ExprKind::DoubleLit(-v)),
        _ => None,
    }
}

/// Fold a binary operator over two literal operands at the promoted type.
/// Integer division by zero is left to fail at run time.
fn fold_binary(op: BinOp, l: &ExprKind, r: &ExprKind, base: BaseType) -> Option<ExprKind> {
    use BinOp::*;
    if matches!(op, AndAnd | OrOr) {
        return match (l, r) {
            (ExprKind::BoolLit(a), ExprKind::BoolLit(b)) => Some(ExprKind::BoolLit(match op {
                AndAnd => *a && *b,
                _ => *a || *b,
            })),
            _ => None,
        };
    }
    if op.is_comparison() {
        let result = match base {
            BaseType::Int => {
                let (a, b) = (const_int(l)?, const_int(r)?);
                compare(op, a.cmp(&b))
            }
            BaseType::Long => {
                let (a, b) = (const_long(l)?, const_long(r)?);
                compare(op, a.cmp(&b))
            }
            BaseType::Float => {
                let (a, b) = (const_float(l)?, const_float(r)?);
                compare(op, a.partial_cmp(&b)?)
            }
            BaseType::Double => {
                let (a, b) = (const_double(l)?, const_double(r)?);
                compare(op, a.partial_cmp(&b)?)
            }
            BaseType::Boolean => {
                let (a, b) = match (l, r) {
                    (ExprKind::BoolLit(a), ExprKind::BoolLit(b)) => (*a, *b),
                    _ => return None,
                };
                match op {
                    Eq => a == b,
                    Ne => a != b,
                    _ => return None,
                }
            }
            _ => return None,
        };
        return Some(ExprKind::BoolLit(result));
    }
    match base {
        BaseType::Boolean => {
            let (a, b) = match (l, r) {
                (ExprKind::BoolLit(a), ExprKind::BoolLit(b)) => (*a, *b),
                _ => return None,
            };
            Some(ExprKind::BoolLit(match op {
                BitAnd => a & b,
                BitOr => a | b,
                BitXor => a ^ b,
                _ => return None,
            }))
        }
        BaseType::Int => {
            let a = const_int(l)?;
            let b = const_int(r)?;
            Some(ExprKind::IntLit(match op {
                Add => a.wrapping_add(b),
                Sub => a.wrapping_sub(b),
                Mul => a.wrapping_mul(b),
                Div if b != 0 => a.wrapping_div(b),
                Rem if b != 0 => a.wrapping_rem(b),
                Shl => a.wrapping_shl(b as u32 & 31),
                Shr => a.wrapping_shr(b as u32 & 31),
                Ushr => ((a as u32) >> (b as u32 & 31)) as i32,
                BitAnd => a & b,
                BitOr => a | b,
                BitXor => a ^ b,
                _ => return None,
            }))
        }
        BaseType::Long => {
            let a = const_long(l)?;
            let shift = const_int(r);
            let b = const_long(r)?;
            Some(ExprKind::LongLit(match op {
                Add => a.wrapping_add(b),
                Sub => a.wrapping_sub(b),
                Mul => a.wrapping_mul(b),
                Div if b != 0 => a.wrapping_div(b),
                Rem if b != 0 => a.wrapping_rem(b),
                Shl => a.wrapping_shl(shift? as u32 & 63),
                Shr => a.wrapping_shr(shift? as u32 & 63),
                Ushr => ((a as u64) >> (shift? as u32 & 63)) as i64,
                BitAnd => a & b,
                BitOr => a | b,
                BitXor => a ^ b,
                _ => return None,
            }))
        }
        BaseType::Float => {
            let a = const_float(l)?;
            let b = const_float(r)?;
            Some(ExprKind::FloatLit(match op {
                Add => a + b,
                Sub => a - b,
                Mul => a * b,
                Div => a / b,
                Rem => a % b,
                _ => return None,
            }))
        }
        BaseType::Double => {
            let a = const_double(l)?;
            let b = const_double(r)?;
            Some(ExprKind::DoubleLit(match op {
                Add => a + b,
                Sub => a - b,
                Mul => a * b,
                Div => a / b,
                Rem => a % b,
                _ => return None,
            }))
        }
        _ => None,
    }
}

fn compare(op: BinOp, ord: std::cmp::Ordering) -> bool {
    use std::cmp::Ordering::*;
    match op {
        BinOp::Eq => ord == Equal,
        BinOp::Ne => ord != Equal,
        BinOp::Lt => ord == Less,
        BinOp::Le => ord != Greater,
        BinOp::Gt => ord == Greater,
        BinOp::Ge => ord != Less,
        _ => false,
    }
}

fn display_list(types: &[TypeDesc]) -> String {
    types
        .iter()
        .map(TypeDesc::display)
        .collect::<Vec<_>>()
        .join(", ")
}
