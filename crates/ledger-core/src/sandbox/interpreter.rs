//! Stack machine running instrumented code.
//!
//! Every instruction charges CPU to the transaction. Allocations charge RAM
//! per object and per field, and every activation record charges RAM per
//! record and per local slot. Calls nest up to a maximal depth, beyond
//! which `lang.StackOverflowError` is thrown.
//!
//! # Contract calls
//!
//! Code annotated `from_contract` learns its caller: the paying account
//! when it is the entry point of a transaction, or the `this` of the
//! invoking frame otherwise, which must then be a contract. Code annotated
//! `payable` receives, before its body runs, the coins named by its first
//! argument, moved from the caller to the receiver.

use std::sync::Arc;

use ledger_sandbox_types::{
    class_names, ConstructorSignature, MethodSignature, StorageReference, StorageType,
    StorageValue,
};

use super::code::{CallKind, ConstructorDef, Instruction, MethodDef};
use super::heap::{Heap, ObjectCapabilities};
use super::throwable::{names, ExecutionFault, ExecutionResult, Throwable};
use super::whitelist::{self, Native};

struct Frame {
    locals: Vec<StorageValue>,
    stack: Vec<StorageValue>,
    this: Option<StorageReference>,
    /// Set for `from_contract` code.
    caller: Option<StorageReference>,
}

impl Frame {
    fn pop(&mut self) -> ExecutionResult<StorageValue> {
        self.stack.pop().ok_or_else(|| malformed("operand stack underflow"))
    }

    /// Pops `count` values, returned in push order.
    fn pop_many(&mut self, count: usize) -> ExecutionResult<Vec<StorageValue>> {
        if self.stack.len() < count {
            return Err(malformed("operand stack underflow"));
        }
        Ok(self.stack.split_off(self.stack.len() - count))
    }

    fn pop_reference(&mut self) -> ExecutionResult<StorageReference> {
        match self.pop()? {
            StorageValue::Reference(reference) => Ok(reference),
            StorageValue::Null => Err(ExecutionFault::thrown(names::NULL_POINTER, "")),
            other => Err(ExecutionFault::thrown(
                names::CLASS_CAST,
                format!("{} is not an object", other),
            )),
        }
    }
}

fn malformed(message: &str) -> ExecutionFault {
    ExecutionFault::thrown(names::VERIFICATION, message)
}

#[derive(Debug, Clone, Copy)]
enum Arithmetic {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
}

/// Runs code against a heap.
pub struct Interpreter<'h, 'a> {
    heap: &'h mut Heap<'a>,
    /// Time of the block, in milliseconds.
    now: u64,
    max_call_depth: usize,
    depth: usize,
}

impl<'h, 'a> Interpreter<'h, 'a> {
    pub fn new(heap: &'h mut Heap<'a>, now: u64, max_call_depth: usize) -> Self {
        Self {
            heap,
            now,
            max_call_depth,
            depth: 0,
        }
    }

    // ===== Entry points =====

    /// Runs a constructor on behalf of `caller` and returns the new object.
    pub fn construct(
        &mut self,
        caller: StorageReference,
        constructor: &ConstructorSignature,
        actuals: Vec<StorageValue>,
    ) -> ExecutionResult<StorageReference> {
        let classes = Arc::clone(self.heap.classes());
        let def = classes.resolve_constructor(constructor).ok_or_else(|| {
            ExecutionFault::thrown(
                names::NO_SUCH_METHOD,
                format!("no constructor {}", constructor),
            )
        })?;
        self.call_constructor(&constructor.defining_class, def, actuals, Some(caller))
    }

    /// Runs an instance method on behalf of `caller`, dispatching on the
    /// runtime class of the receiver.
    pub fn invoke_instance(
        &mut self,
        caller: StorageReference,
        method: &MethodSignature,
        receiver: StorageReference,
        actuals: Vec<StorageValue>,
    ) -> ExecutionResult<Option<StorageValue>> {
        if !self.heap.is_instance_of(receiver, &method.defining_class)? {
            return Err(ExecutionFault::thrown(
                names::ILLEGAL_ARGUMENT,
                format!("{} is not a {}", receiver, method.defining_class),
            ));
        }
        let classes = Arc::clone(self.heap.classes());
        let class = self.heap.class_of(receiver)?;
        let def = instance_method(&classes, &class, method)?;
        self.call_method(def, Some(receiver), actuals, Some(caller))
    }

    /// Runs a static method on behalf of `caller`.
    pub fn invoke_static(
        &mut self,
        caller: StorageReference,
        method: &MethodSignature,
        actuals: Vec<StorageValue>,
    ) -> ExecutionResult<Option<StorageValue>> {
        let classes = Arc::clone(self.heap.classes());
        let def = static_method(&classes, method)?;
        self.call_method(def, None, actuals, Some(caller))
    }

    // ===== Calls =====

    fn call_constructor(
        &mut self,
        class: &str,
        def: &ConstructorDef,
        actuals: Vec<StorageValue>,
        caller: Option<StorageReference>,
    ) -> ExecutionResult<StorageReference> {
        self.check_actuals(&def.formals, &actuals)?;
        let caller = contract_caller(def.annotations.from_contract, caller)?;
        let object = self.heap.allocate(class)?;
        if def.annotations.payable {
            self.receive_payment(caller, Some(object), &actuals)?;
        }

        let mut locals = Vec::with_capacity(actuals.len() + 1);
        locals.push(StorageValue::Reference(object));
        locals.extend(actuals);
        self.enter(&def.code, locals, def.locals, Some(object), caller, false)?;
        Ok(object)
    }

    fn call_method(
        &mut self,
        def: &MethodDef,
        this: Option<StorageReference>,
        actuals: Vec<StorageValue>,
        caller: Option<StorageReference>,
    ) -> ExecutionResult<Option<StorageValue>> {
        self.check_actuals(&def.formals, &actuals)?;
        let caller = contract_caller(def.annotations.from_contract, caller)?;
        if def.annotations.payable {
            self.receive_payment(caller, this, &actuals)?;
        }

        let mut locals = Vec::with_capacity(actuals.len() + 1);
        if let Some(this) = this {
            locals.push(StorageValue::Reference(this));
        }
        locals.extend(actuals);
        self.enter(
            &def.code,
            locals,
            def.locals,
            this,
            caller,
            def.returns.is_some(),
        )
    }

    fn enter(
        &mut self,
        code: &[Instruction],
        locals: Vec<StorageValue>,
        extra_locals: u16,
        this: Option<StorageReference>,
        caller: Option<StorageReference>,
        returns: bool,
    ) -> ExecutionResult<Option<StorageValue>> {
        self.depth += 1;
        let result = if self.depth > self.max_call_depth {
            Err(ExecutionFault::thrown(
                names::STACK_OVERFLOW,
                format!("more than {} nested calls", self.max_call_depth),
            ))
        } else {
            self.execute(code, locals, extra_locals, this, caller, returns)
        };
        self.depth -= 1;
        result
    }

    /// Moves the amount in the first actual from `caller` to `receiver`.
    fn receive_payment(
        &mut self,
        caller: Option<StorageReference>,
        receiver: Option<StorageReference>,
        actuals: &[StorageValue],
    ) -> ExecutionResult<()> {
        let (Some(caller), Some(receiver)) = (caller, receiver) else {
            return Err(ExecutionFault::thrown(
                names::ILLEGAL_STATE,
                "payable code needs a caller and a receiver",
            ));
        };
        let amount = match actuals.first() {
            Some(StorageValue::BigInteger(amount)) => *amount,
            Some(StorageValue::Int(amount)) if *amount >= 0 => *amount as u128,
            _ => {
                return Err(ExecutionFault::thrown(
                    names::ILLEGAL_ARGUMENT,
                    "payable code needs a non-negative amount as first argument",
                ))
            }
        };

        let balance = self.heap.get_balance(caller)?;
        if balance < amount {
            return Err(ExecutionFault::thrown(
                names::INSUFFICIENT_FUNDS,
                format!("{} cannot pay {}", caller, amount),
            ));
        }
        self.heap.set_balance(caller, balance - amount)?;
        let received = self
            .heap
            .get_balance(receiver)?
            .checked_add(amount)
            .ok_or_else(|| ExecutionFault::thrown(names::ARITHMETIC, "balance overflow"))?;
        self.heap.set_balance(receiver, received)
    }

    fn check_actuals(
        &mut self,
        formals: &[StorageType],
        actuals: &[StorageValue],
    ) -> ExecutionResult<()> {
        if formals.len() != actuals.len() {
            return Err(ExecutionFault::thrown(
                names::ILLEGAL_ARGUMENT,
                format!("expected {} actuals, found {}", formals.len(), actuals.len()),
            ));
        }
        for (formal, actual) in formals.iter().zip(actuals) {
            if !actual.fits(formal) {
                return Err(ExecutionFault::thrown(
                    names::ILLEGAL_ARGUMENT,
                    format!("{} is not a {}", actual, formal),
                ));
            }
            if let (StorageType::Class(class), Some(object)) = (formal, actual.as_reference()) {
                if !self.heap.is_instance_of(object, class)? {
                    return Err(ExecutionFault::thrown(
                        names::ILLEGAL_ARGUMENT,
                        format!("{} is not a {}", object, class),
                    ));
                }
            }
        }
        Ok(())
    }

    /// The caller seen by `from_contract` code invoked from a frame whose
    /// receiver is `this`.
    fn caller_from(
        &mut self,
        from_contract: bool,
        this: Option<StorageReference>,
    ) -> ExecutionResult<Option<StorageReference>> {
        if !from_contract {
            return Ok(None);
        }
        match this {
            Some(this) if self.heap.is_instance_of(this, class_names::CONTRACT)? => Ok(Some(this)),
            _ => Err(ExecutionFault::thrown(
                names::ILLEGAL_STATE,
                "from_contract code can only be called by a contract",
            )),
        }
    }

    // ===== Execution =====

    fn execute(
        &mut self,
        code: &[Instruction],
        mut locals: Vec<StorageValue>,
        extra_locals: u16,
        this: Option<StorageReference>,
        caller: Option<StorageReference>,
        returns: bool,
    ) -> ExecutionResult<Option<StorageValue>> {
        locals.extend(std::iter::repeat(StorageValue::Null).take(usize::from(extra_locals)));
        let costs = self.heap.costs();
        self.heap.charger_mut().charge_cpu(costs.cpu_cost_of_invoke)?;
        self.heap
            .charger_mut()
            .charge_ram(costs.ram_cost_of_activation(locals.len() as u64))?;

        let mut frame = Frame {
            locals,
            stack: Vec::new(),
            this,
            caller,
        };
        let mut pc = 0usize;

        loop {
            let Some(instruction) = code.get(pc) else {
                return if returns {
                    Err(malformed("missing return value"))
                } else {
                    Ok(None)
                };
            };
            pc += 1;
            self.heap
                .charger_mut()
                .charge_cpu(costs.cpu_cost_of_instruction)?;

            match instruction {
                Instruction::Push(value) => frame.stack.push(value.clone()),
                Instruction::Load(index) => {
                    let value = frame
                        .locals
                        .get(usize::from(*index))
                        .cloned()
                        .ok_or_else(|| malformed("no such local"))?;
                    frame.stack.push(value);
                }
                Instruction::Store(index) => {
                    let value = frame.pop()?;
                    let slot = frame
                        .locals
                        .get_mut(usize::from(*index))
                        .ok_or_else(|| malformed("no such local"))?;
                    *slot = value;
                }
                Instruction::Pop => {
                    frame.pop()?;
                }
                Instruction::Dup => {
                    let value = frame.pop()?;
                    frame.stack.push(value.clone());
                    frame.stack.push(value);
                }
                Instruction::New(constructor) => {
                    let actuals = frame.pop_many(constructor.formals.len())?;
                    let classes = Arc::clone(self.heap.classes());
                    let def = classes.resolve_constructor(constructor).ok_or_else(|| {
                        ExecutionFault::thrown(
                            names::NO_SUCH_METHOD,
                            format!("no constructor {}", constructor),
                        )
                    })?;
                    let caller = self.caller_from(def.annotations.from_contract, frame.this)?;
                    let object =
                        self.call_constructor(&constructor.defining_class, def, actuals, caller)?;
                    frame.stack.push(StorageValue::Reference(object));
                }
                Instruction::GetField(field) => {
                    self.heap
                        .charger_mut()
                        .charge_cpu(costs.cpu_cost_of_field_access)?;
                    let object = frame.pop_reference()?;
                    let value = self.heap.get_field(object, field)?;
                    frame.stack.push(value);
                }
                Instruction::PutField(field) => {
                    self.heap
                        .charger_mut()
                        .charge_cpu(costs.cpu_cost_of_field_access)?;
                    let value = frame.pop()?;
                    let object = frame.pop_reference()?;
                    self.heap.set_field(object, field, value)?;
                }
                Instruction::Invoke(method, kind) => {
                    let actuals = frame.pop_many(method.formals.len())?;
                    let receiver = match kind {
                        CallKind::Virtual => Some(frame.pop_reference()?),
                        CallKind::Static => None,
                    };
                    if let Some(result) = self.invoke(frame.this, method, receiver, actuals)? {
                        frame.stack.push(result);
                    }
                }
                Instruction::InvokeWithGas(method, kind) => {
                    let actuals = frame.pop_many(method.formals.len())?;
                    let receiver = match kind {
                        CallKind::Virtual => Some(frame.pop_reference()?),
                        CallKind::Static => None,
                    };
                    let gas = match frame.pop()? {
                        StorageValue::Int(gas) if gas >= 0 => gas as u64,
                        StorageValue::BigInteger(gas) => u64::try_from(gas).unwrap_or(u64::MAX),
                        other => {
                            return Err(ExecutionFault::thrown(
                                names::ILLEGAL_ARGUMENT,
                                format!("invalid gas amount {}", other),
                            ))
                        }
                    };

                    self.heap.charger_mut().push_gas(gas)?;
                    let result = self.invoke(frame.this, method, receiver, actuals);
                    self.heap.charger_mut().pop_gas();
                    if let Some(result) = result? {
                        frame.stack.push(result);
                    }
                }
                Instruction::CallNative { name, arity } => {
                    let native = whitelist::resolve(name, *arity)?;
                    self.heap
                        .charger_mut()
                        .charge_cpu(costs.cpu_cost_of_native)?;
                    let args = frame.pop_many(usize::from(*arity))?;
                    if let Some(result) = self.call_native(native, args, frame.caller)? {
                        frame.stack.push(result);
                    }
                }
                Instruction::Add => binary(&mut frame, Arithmetic::Add)?,
                Instruction::Sub => binary(&mut frame, Arithmetic::Sub)?,
                Instruction::Mul => binary(&mut frame, Arithmetic::Mul)?,
                Instruction::Div => binary(&mut frame, Arithmetic::Div)?,
                Instruction::Rem => binary(&mut frame, Arithmetic::Rem)?,
                Instruction::Lt => {
                    let b = frame.pop()?;
                    let a = frame.pop()?;
                    let less = match (&a, &b) {
                        (StorageValue::Int(a), StorageValue::Int(b)) => a < b,
                        (StorageValue::BigInteger(a), StorageValue::BigInteger(b)) => a < b,
                        _ => {
                            return Err(ExecutionFault::thrown(
                                names::CLASS_CAST,
                                format!("cannot compare {} and {}", a, b),
                            ))
                        }
                    };
                    frame.stack.push(StorageValue::Boolean(less));
                }
                Instruction::Eq => {
                    let b = frame.pop()?;
                    let a = frame.pop()?;
                    frame.stack.push(StorageValue::Boolean(a == b));
                }
                Instruction::Not => {
                    let value = pop_bool(&mut frame)?;
                    frame.stack.push(StorageValue::Boolean(!value));
                }
                Instruction::Jump(target) => pc = *target as usize,
                Instruction::JumpIfFalse(target) => {
                    if !pop_bool(&mut frame)? {
                        pc = *target as usize;
                    }
                }
                Instruction::Return => {
                    return if returns {
                        Ok(Some(frame.pop()?))
                    } else {
                        Ok(None)
                    };
                }
                Instruction::Throw {
                    class_name,
                    checked,
                } => {
                    let message = match frame.pop()? {
                        StorageValue::String(message) => message,
                        StorageValue::Null => String::new(),
                        other => other.to_string(),
                    };
                    let throwable = Throwable {
                        class_name: class_name.clone(),
                        message,
                        checked: *checked,
                    };
                    return Err(throwable.into());
                }
            }
        }
    }

    /// Invokes a method from code running on `this`.
    fn invoke(
        &mut self,
        this: Option<StorageReference>,
        method: &MethodSignature,
        receiver: Option<StorageReference>,
        actuals: Vec<StorageValue>,
    ) -> ExecutionResult<Option<StorageValue>> {
        let classes = Arc::clone(self.heap.classes());
        let def = match receiver {
            Some(receiver) => {
                let class = self.heap.class_of(receiver)?;
                if !classes.is_subclass_of(&class, &method.defining_class) {
                    return Err(ExecutionFault::thrown(
                        names::CLASS_CAST,
                        format!("{} is not a {}", receiver, method.defining_class),
                    ));
                }
                instance_method(&classes, &class, method)?
            }
            None => static_method(&classes, method)?,
        };
        let caller = self.caller_from(def.annotations.from_contract, this)?;
        self.call_method(def, receiver, actuals, caller)
    }

    fn call_native(
        &mut self,
        native: Native,
        args: Vec<StorageValue>,
        caller: Option<StorageReference>,
    ) -> ExecutionResult<Option<StorageValue>> {
        let mut args = args.into_iter();
        let mut next = || args.next().ok_or_else(|| malformed("missing native argument"));

        let result = match native {
            Native::Now => StorageValue::Int(i64::try_from(self.now).unwrap_or(i64::MAX)),
            Native::Caller => {
                let caller = caller.ok_or_else(|| {
                    ExecutionFault::thrown(
                        names::ILLEGAL_STATE,
                        "caller() is only available to from_contract code",
                    )
                })?;
                StorageValue::Reference(caller)
            }
            Native::Emit => {
                let event = match next()? {
                    StorageValue::Reference(event) => event,
                    StorageValue::Null => {
                        return Err(ExecutionFault::thrown(names::NULL_POINTER, "null event"))
                    }
                    other => {
                        return Err(ExecutionFault::thrown(
                            names::ILLEGAL_ARGUMENT,
                            format!("{} is not an event", other),
                        ))
                    }
                };
                if !self.heap.is_instance_of(event, class_names::EVENT)? {
                    return Err(ExecutionFault::thrown(
                        names::ILLEGAL_ARGUMENT,
                        format!("{} is not an event", event),
                    ));
                }
                self.heap.emit(event);
                return Ok(None);
            }
            Native::BalanceOf => match next()? {
                StorageValue::Reference(contract) => {
                    StorageValue::BigInteger(self.heap.get_balance(contract)?)
                }
                StorageValue::Null => return Err(ExecutionFault::thrown(names::NULL_POINTER, "")),
                other => {
                    return Err(ExecutionFault::thrown(
                        names::CLASS_CAST,
                        format!("{} is not a contract", other),
                    ))
                }
            },
            Native::Concat => {
                let a = string_arg(next()?)?;
                let b = string_arg(next()?)?;
                let joined = a + &b;
                let cost = self.heap.costs().ram_cost_of_string(joined.len() as u64);
                self.heap.charger_mut().charge_ram(cost)?;
                StorageValue::String(joined)
            }
            Native::Length => {
                let s = string_arg(next()?)?;
                StorageValue::Int(s.len() as i64)
            }
        };
        Ok(Some(result))
    }
}

fn contract_caller(
    from_contract: bool,
    caller: Option<StorageReference>,
) -> ExecutionResult<Option<StorageReference>> {
    match (from_contract, caller) {
        (false, _) => Ok(None),
        (true, Some(caller)) => Ok(Some(caller)),
        (true, None) => Err(ExecutionFault::thrown(
            names::ILLEGAL_STATE,
            "from_contract code called without a caller",
        )),
    }
}

fn instance_method<'c>(
    classes: &'c super::loader::LoadedClasspath,
    class: &str,
    method: &MethodSignature,
) -> ExecutionResult<&'c MethodDef> {
    match classes.resolve_method(class, method) {
        Some((_, def)) if !def.is_static => Ok(def),
        _ => Err(ExecutionFault::thrown(
            names::NO_SUCH_METHOD,
            format!("no instance method {} for class {}", method, class),
        )),
    }
}

fn static_method<'c>(
    classes: &'c super::loader::LoadedClasspath,
    method: &MethodSignature,
) -> ExecutionResult<&'c MethodDef> {
    match classes.resolve_method(&method.defining_class, method) {
        Some((_, def)) if def.is_static => Ok(def),
        _ => Err(ExecutionFault::thrown(
            names::NO_SUCH_METHOD,
            format!("no static method {}", method),
        )),
    }
}

fn string_arg(value: StorageValue) -> ExecutionResult<String> {
    match value {
        StorageValue::String(s) => Ok(s),
        StorageValue::Null => Err(ExecutionFault::thrown(names::NULL_POINTER, "null string")),
        other => Err(ExecutionFault::thrown(
            names::CLASS_CAST,
            format!("{} is not a string", other),
        )),
    }
}

fn pop_bool(frame: &mut Frame) -> ExecutionResult<bool> {
    match frame.pop()? {
        StorageValue::Boolean(value) => Ok(value),
        other => Err(ExecutionFault::thrown(
            names::CLASS_CAST,
            format!("{} is not a boolean", other),
        )),
    }
}

fn binary(frame: &mut Frame, op: Arithmetic) -> ExecutionResult<()> {
    let b = frame.pop()?;
    let a = frame.pop()?;
    let result = match (&a, &b) {
        (StorageValue::Int(x), StorageValue::Int(y)) => match op {
            Arithmetic::Add => x.checked_add(*y),
            Arithmetic::Sub => x.checked_sub(*y),
            Arithmetic::Mul => x.checked_mul(*y),
            Arithmetic::Div => x.checked_div(*y),
            Arithmetic::Rem => x.checked_rem(*y),
        }
        .map(StorageValue::Int),
        (StorageValue::BigInteger(x), StorageValue::BigInteger(y)) => match op {
            Arithmetic::Add => x.checked_add(*y),
            Arithmetic::Sub => x.checked_sub(*y),
            Arithmetic::Mul => x.checked_mul(*y),
            Arithmetic::Div => x.checked_div(*y),
            Arithmetic::Rem => x.checked_rem(*y),
        }
        .map(StorageValue::BigInteger),
        _ => {
            return Err(ExecutionFault::thrown(
                names::CLASS_CAST,
                format!("cannot apply {:?} to {} and {}", op, a, b),
            ))
        }
    };
    let result = result.ok_or_else(|| {
        ExecutionFault::thrown(names::ARITHMETIC, format!("{:?} of {} and {}", op, a, b))
    })?;
    frame.stack.push(result);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gas::{GasCharger, GasCostModel};
    use crate::sandbox::code::{ClassDef, CodeUnit};
    use crate::sandbox::lang::base_code_unit;
    use crate::sandbox::loader::{ClasspathLimits, LoadedClasspath};
    use ledger_sandbox_store::{MemoryBackend, MemoryStore, Store};
    use ledger_sandbox_types::{
        Classpath, FieldSignature, GameteCreationRequest, GameteCreationResponse,
        JarStoreInitialRequest, JarStoreInitialResponse, TransactionReference, TransactionRequest,
        TransactionResponse, Update,
    };
    use crate::sandbox::code::Instruction::*;

    fn counter_class() -> ClassDef {
        let count = FieldSignature::new("test.Counter", "count", StorageType::Int);
        ClassDef::new("test.Counter", Some(class_names::CONTRACT))
            .with_field("count", StorageType::Int)
            .with_constructor(ConstructorDef::new(vec![], vec![Return]))
            .with_method(MethodDef::instance(
                "increment",
                vec![],
                Some(StorageType::Int),
                vec![
                    Load(0),
                    Load(0),
                    GetField(count.clone()),
                    Push(StorageValue::Int(1)),
                    Add,
                    PutField(count.clone()),
                    Load(0),
                    GetField(count),
                    Return,
                ],
            ))
            .with_method(MethodDef::static_method(
                "sum",
                vec![StorageType::Int],
                Some(StorageType::Int),
                // n + (n - 1) + ... + 1
                vec![
                    Push(StorageValue::Int(0)),
                    Store(1),
                    // 2: loop head
                    Load(0),
                    Push(StorageValue::Int(0)),
                    Eq,
                    Not,
                    JumpIfFalse(16),
                    Load(1),
                    Load(0),
                    Add,
                    Store(1),
                    Load(0),
                    Push(StorageValue::Int(1)),
                    Sub,
                    Store(0),
                    Jump(2),
                    // 16
                    Load(1),
                    Return,
                ],
            ).with_locals(1))
            .with_method(MethodDef::static_method(
                "recurse",
                vec![],
                None,
                vec![
                    Invoke(
                        MethodSignature::new("test.Counter", "recurse", vec![], None),
                        CallKind::Static,
                    ),
                    Return,
                ],
            ))
            .with_method(MethodDef::static_method(
                "bounded",
                vec![],
                None,
                vec![
                    Push(StorageValue::Int(100)),
                    InvokeWithGas(
                        MethodSignature::new("test.Counter", "recurse", vec![], None),
                        CallKind::Static,
                    ),
                    Return,
                ],
            ))
            .with_method(MethodDef::static_method(
                "clock",
                vec![],
                Some(StorageType::Int),
                vec![CallNative { name: "system.currentTimeMillis".into(), arity: 0 }, Return],
            ))
            .with_method(MethodDef::static_method(
                "fail",
                vec![],
                None,
                vec![
                    Push(StorageValue::string("nope")),
                    Throw {
                        class_name: "test.MyException".into(),
                        checked: true,
                    },
                ],
            ))
    }

    struct Fixture {
        store: MemoryStore,
        classes: Arc<LoadedClasspath>,
        account: StorageReference,
        counter: StorageReference,
    }

    impl Fixture {
        /// A heap for transaction 2 with `gas` units.
        fn heap<'a>(&'a self, costs: &'a GasCostModel, gas: u64) -> Heap<'a> {
            Heap::new(
                &self.store,
                self.classes.clone(),
                costs,
                GasCharger::new(gas),
                TransactionReference(2),
            )
        }
    }

    fn sum() -> MethodSignature {
        MethodSignature::new(
            "test.Counter",
            "sum",
            vec![StorageType::Int],
            Some(StorageType::Int),
        )
    }

    fn fixture() -> Fixture {
        let store = MemoryStore::new(MemoryBackend::new());
        let mut unit = base_code_unit();
        unit.classes.push(counter_class());
        let jar = CodeUnit::to_bytes(&unit).unwrap();
        store
            .push(
                TransactionReference(0),
                &TransactionRequest::JarStoreInitial(JarStoreInitialRequest {
                    jar: jar.clone(),
                    dependencies: vec![],
                }),
                &TransactionResponse::JarStoreInitial(JarStoreInitialResponse {
                    instrumented_jar: jar,
                    dependencies: vec![],
                }),
            )
            .unwrap();

        let account = StorageReference::new(TransactionReference(1), 0);
        let counter = StorageReference::new(TransactionReference(1), 1);
        let count = FieldSignature::new("test.Counter", "count", StorageType::Int);
        store
            .push(
                TransactionReference(1),
                &TransactionRequest::GameteCreation(GameteCreationRequest {
                    classpath: Classpath::new(TransactionReference(0), true),
                    initial_amount: 1_000,
                    public_key: String::new(),
                }),
                &TransactionResponse::GameteCreation(GameteCreationResponse {
                    updates: vec![
                        Update::class_tag(account, class_names::GAMETE, TransactionReference(0)),
                        Update::field(
                            account,
                            FieldSignature::balance(),
                            StorageValue::BigInteger(1_000),
                        ),
                        Update::field(
                            account,
                            FieldSignature::nonce(),
                            StorageValue::BigInteger(0),
                        ),
                        Update::field(
                            account,
                            FieldSignature::public_key(),
                            StorageValue::string(""),
                        ),
                        Update::class_tag(counter, "test.Counter", TransactionReference(0)),
                        Update::field(
                            counter,
                            FieldSignature::balance(),
                            StorageValue::BigInteger(0),
                        ),
                        Update::field(counter, count, StorageValue::Int(41)),
                    ],
                    gamete: account,
                }),
            )
            .unwrap();

        let classes = LoadedClasspath::link(
            &store,
            &[Classpath::new(TransactionReference(0), true)],
            &ClasspathLimits {
                max_dependencies: 20,
                max_dependencies_size: 1_000_000,
            },
        )
        .unwrap();
        Fixture {
            store,
            classes: Arc::new(classes),
            account,
            counter,
        }
    }

    fn thrown(fault: ExecutionFault) -> Throwable {
        match fault {
            ExecutionFault::Thrown(throwable) => throwable,
            ExecutionFault::Internal(e) => panic!("unexpected internal error: {e:#}"),
        }
    }

    #[test]
    fn test_instance_method_updates_field() {
        let f = fixture();
        let costs = GasCostModel::default();
        let mut heap = f.heap(&costs, 10_000);
        let method =
            MethodSignature::new("test.Counter", "increment", vec![], Some(StorageType::Int));

        let result = Interpreter::new(&mut heap, 0, 16)
            .invoke_instance(f.account, &method, f.counter, vec![])
            .unwrap();
        assert_eq!(result, Some(StorageValue::Int(42)));

        let updates = heap.updates(&[f.account, f.counter]);
        assert_eq!(updates.len(), 1);
        assert!(heap.charger().consumed().cpu > 0);
        assert!(heap.charger().consumed().ram >= costs.ram_cost_of_activation(1));
    }

    #[test]
    fn test_loop_and_locals() {
        let f = fixture();
        let costs = GasCostModel::default();
        let mut heap = f.heap(&costs, 100_000);
        let method = sum();

        let result = Interpreter::new(&mut heap, 0, 16)
            .invoke_static(f.account, &method, vec![StorageValue::Int(4)])
            .unwrap();
        assert_eq!(result, Some(StorageValue::Int(4 + 3 + 2 + 1)));
    }

    #[test]
    fn test_recursion_overflows_stack() {
        let f = fixture();
        let costs = GasCostModel::default();
        let mut heap = f.heap(&costs, 1_000_000);
        let method = MethodSignature::new("test.Counter", "recurse", vec![], None);

        let err = Interpreter::new(&mut heap, 0, 8)
            .invoke_static(f.account, &method, vec![])
            .unwrap_err();
        assert_eq!(thrown(err).class_name, names::STACK_OVERFLOW);
    }

    #[test]
    fn test_gas_bounded_call_returns_unused_gas() {
        let f = fixture();
        let costs = GasCostModel::default();
        let mut heap = f.heap(&costs, 100_000);
        let method = MethodSignature::new("test.Counter", "bounded", vec![], None);

        let err = Interpreter::new(&mut heap, 0, 10_000)
            .invoke_static(f.account, &method, vec![])
            .unwrap_err();
        assert_eq!(thrown(err).class_name, names::OUT_OF_GAS);
        assert!(heap.charger().remaining() > 99_000);
    }

    #[test]
    fn test_out_of_gas_in_loop() {
        let f = fixture();
        let costs = GasCostModel::default();
        let mut heap = f.heap(&costs, 200);
        let method = sum();

        let err = Interpreter::new(&mut heap, 0, 16)
            .invoke_static(f.account, &method, vec![StorageValue::Int(1_000)])
            .unwrap_err();
        let throwable = thrown(err);
        assert_eq!(throwable.class_name, names::OUT_OF_GAS);
        assert!(!throwable.checked);
    }

    #[test]
    fn test_non_deterministic_native_is_refused() {
        let f = fixture();
        let costs = GasCostModel::default();
        let mut heap = f.heap(&costs, 10_000);
        let method = MethodSignature::new("test.Counter", "clock", vec![], Some(StorageType::Int));

        let err = Interpreter::new(&mut heap, 0, 16)
            .invoke_static(f.account, &method, vec![])
            .unwrap_err();
        assert_eq!(thrown(err).class_name, names::NON_WHITE_LISTED_CALL);
    }

    #[test]
    fn test_checked_throw() {
        let f = fixture();
        let costs = GasCostModel::default();
        let mut heap = f.heap(&costs, 10_000);
        let method = MethodSignature::new("test.Counter", "fail", vec![], None);

        let throwable = thrown(
            Interpreter::new(&mut heap, 0, 16)
                .invoke_static(f.account, &method, vec![])
                .unwrap_err(),
        );
        assert!(throwable.checked);
        assert_eq!(throwable.message, "nope");
    }

    #[test]
    fn test_payable_moves_coins() {
        let f = fixture();
        let costs = GasCostModel::default();
        let mut heap = f.heap(&costs, 10_000);
        let receive = MethodSignature::new(
            class_names::CONTRACT,
            "receive",
            vec![StorageType::BigInteger],
            None,
        );

        Interpreter::new(&mut heap, 0, 16)
            .invoke_instance(f.account, &receive, f.counter, vec![StorageValue::BigInteger(300)])
            .unwrap();
        assert_eq!(heap.get_balance(f.account).unwrap(), 700);
        assert_eq!(heap.get_balance(f.counter).unwrap(), 300);

        let err = Interpreter::new(&mut heap, 0, 16)
            .invoke_instance(f.account, &receive, f.counter, vec![StorageValue::BigInteger(701)])
            .unwrap_err();
        assert_eq!(thrown(err).class_name, names::INSUFFICIENT_FUNDS);
    }

    #[test]
    fn test_payable_constructor_funds_new_account() {
        let f = fixture();
        let costs = GasCostModel::default();
        let mut heap = f.heap(&costs, 10_000);
        let constructor = ConstructorSignature::new(
            class_names::EXTERNALLY_OWNED_ACCOUNT,
            vec![StorageType::BigInteger, StorageType::String],
        );

        let account = Interpreter::new(&mut heap, 0, 16)
            .construct(
                f.account,
                &constructor,
                vec![StorageValue::BigInteger(250), StorageValue::string("key")],
            )
            .unwrap();
        assert_eq!(account, StorageReference::new(TransactionReference(2), 0));
        assert_eq!(heap.get_balance(account).unwrap(), 250);
        assert_eq!(heap.get_balance(f.account).unwrap(), 750);
        assert_eq!(
            heap.get_field(account, &FieldSignature::public_key()).unwrap(),
            StorageValue::string("key")
        );
    }

    #[test]
    fn test_wrong_actuals_are_illegal_arguments() {
        let f = fixture();
        let costs = GasCostModel::default();
        let mut heap = f.heap(&costs, 10_000);
        let method = sum();

        let err = Interpreter::new(&mut heap, 0, 16)
            .invoke_static(f.account, &method, vec![StorageValue::string("x")])
            .unwrap_err();
        assert_eq!(thrown(err).class_name, names::ILLEGAL_ARGUMENT);

        let missing = MethodSignature::new("test.Counter", "missing", vec![], None);
        let err = Interpreter::new(&mut heap, 0, 16)
            .invoke_static(f.account, &missing, vec![])
            .unwrap_err();
        assert_eq!(thrown(err).class_name, names::NO_SUCH_METHOD);
    }
}
