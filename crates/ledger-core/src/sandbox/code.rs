//! Instrumented code units.
//!
//! A code unit is what a jar-store transaction installs: a set of classes
//! whose constructors and methods are sequences of stack instructions. The
//! verifier that produces units is outside the engine; the engine decodes
//! them (BCS), links them against a classpath and runs them.
//!
//! # Frames
//!
//! Local 0 holds `this` for constructors and instance methods, followed by
//! the formal parameters and then `locals` extra slots initialized to null.

use anyhow::Result;
use serde::{Deserialize, Serialize};

use ledger_sandbox_types::encoding::{bcs_decode, bcs_encode};
use ledger_sandbox_types::{
    ConstructorSignature, FieldSignature, MethodSignature, StorageType, StorageValue,
};

/// Annotations checked at runtime by the instrumented code.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Annotations {
    /// Only callable by a contract; the callee learns its caller.
    pub from_contract: bool,
    /// Receives the coins in its first argument from the caller.
    pub payable: bool,
    /// May let checked exceptions escape to the transaction.
    pub throws_exceptions: bool,
    /// Must not modify the state of any object.
    pub view: bool,
}

/// How an invocation is dispatched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CallKind {
    /// On the runtime class of the receiver, popped below the arguments.
    Virtual,
    /// On the class named by the signature.
    Static,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Instruction {
    Push(StorageValue),
    Load(u16),
    Store(u16),
    Pop,
    Dup,
    /// Pops the actuals, allocates an object and runs the constructor on it.
    /// Pushes the new object.
    New(ConstructorSignature),
    GetField(FieldSignature),
    /// Pops the value, then the object.
    PutField(FieldSignature),
    Invoke(MethodSignature, CallKind),
    /// Like [`Instruction::Invoke`], with a gas amount pushed before the
    /// receiver (or before the actuals of a static call). The callee may
    /// consume at most that amount.
    InvokeWithGas(MethodSignature, CallKind),
    /// Calls a native of the whitelist, popping `arity` arguments.
    CallNative { name: String, arity: u8 },
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Lt,
    Eq,
    Not,
    Jump(u32),
    JumpIfFalse(u32),
    /// Returns the top of the stack, or nothing for void code.
    Return,
    /// Pops a message (string or null) and throws.
    Throw { class_name: String, checked: bool },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldDef {
    pub name: String,
    pub ty: StorageType,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConstructorDef {
    pub formals: Vec<StorageType>,
    pub annotations: Annotations,
    pub locals: u16,
    pub code: Vec<Instruction>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MethodDef {
    pub name: String,
    pub formals: Vec<StorageType>,
    pub returns: Option<StorageType>,
    pub is_static: bool,
    pub annotations: Annotations,
    pub locals: u16,
    pub code: Vec<Instruction>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassDef {
    pub name: String,
    /// `None` only for the root of the hierarchy.
    pub superclass: Option<String>,
    pub fields: Vec<FieldDef>,
    pub constructors: Vec<ConstructorDef>,
    pub methods: Vec<MethodDef>,
}

/// The unit of code installed by a jar-store transaction.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodeUnit {
    pub classes: Vec<ClassDef>,
}

// =============================================================================
// Encoding
// =============================================================================

impl CodeUnit {
    pub fn new(classes: Vec<ClassDef>) -> Self {
        Self { classes }
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        bcs_encode(self, "code unit")
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        bcs_decode(bytes, "code unit")
    }
}

// =============================================================================
// Builders
// =============================================================================

impl ClassDef {
    pub fn new(name: impl Into<String>, superclass: Option<&str>) -> Self {
        Self {
            name: name.into(),
            superclass: superclass.map(str::to_string),
            fields: Vec::new(),
            constructors: Vec::new(),
            methods: Vec::new(),
        }
    }

    pub fn with_field(mut self, name: impl Into<String>, ty: StorageType) -> Self {
        self.fields.push(FieldDef {
            name: name.into(),
            ty,
        });
        self
    }

    pub fn with_constructor(mut self, constructor: ConstructorDef) -> Self {
        self.constructors.push(constructor);
        self
    }

    pub fn with_method(mut self, method: MethodDef) -> Self {
        self.methods.push(method);
        self
    }

    /// Signature of a field declared by this class.
    pub fn field(&self, name: &str) -> Option<FieldSignature> {
        self.fields
            .iter()
            .find(|field| field.name == name)
            .map(|field| {
                FieldSignature::new(self.name.clone(), field.name.clone(), field.ty.clone())
            })
    }

    pub fn constructor(&self, formals: &[StorageType]) -> Option<&ConstructorDef> {
        self.constructors.iter().find(|c| c.formals == formals)
    }

    /// Method declared by this class with the name, formals and return type
    /// of the signature. The defining class of the signature is not checked.
    pub fn method(&self, signature: &MethodSignature) -> Option<&MethodDef> {
        self.methods.iter().find(|m| {
            m.name == signature.name
                && m.formals == signature.formals
                && m.returns == signature.returns
        })
    }
}

impl ConstructorDef {
    pub fn new(formals: Vec<StorageType>, code: Vec<Instruction>) -> Self {
        Self {
            formals,
            annotations: Annotations::default(),
            locals: 0,
            code,
        }
    }

    pub fn from_contract(mut self) -> Self {
        self.annotations.from_contract = true;
        self
    }

    /// Payable code is also `from_contract`.
    pub fn payable(mut self) -> Self {
        self.annotations.payable = true;
        self.annotations.from_contract = true;
        self
    }

    pub fn throws_exceptions(mut self) -> Self {
        self.annotations.throws_exceptions = true;
        self
    }

    pub fn with_locals(mut self, locals: u16) -> Self {
        self.locals = locals;
        self
    }
}

impl MethodDef {
    pub fn instance(
        name: impl Into<String>,
        formals: Vec<StorageType>,
        returns: Option<StorageType>,
        code: Vec<Instruction>,
    ) -> Self {
        Self {
            name: name.into(),
            formals,
            returns,
            is_static: false,
            annotations: Annotations::default(),
            locals: 0,
            code,
        }
    }

    pub fn static_method(
        name: impl Into<String>,
        formals: Vec<StorageType>,
        returns: Option<StorageType>,
        code: Vec<Instruction>,
    ) -> Self {
        Self {
            is_static: true,
            ..Self::instance(name, formals, returns, code)
        }
    }

    pub fn from_contract(mut self) -> Self {
        self.annotations.from_contract = true;
        self
    }

    /// Payable code is also `from_contract`.
    pub fn payable(mut self) -> Self {
        self.annotations.payable = true;
        self.annotations.from_contract = true;
        self
    }

    pub fn throws_exceptions(mut self) -> Self {
        self.annotations.throws_exceptions = true;
        self
    }

    pub fn view(mut self) -> Self {
        self.annotations.view = true;
        self
    }

    pub fn with_locals(mut self, locals: u16) -> Self {
        self.locals = locals;
        self
    }

    /// The signature of this method as declared by `defining_class`.
    pub fn signature(&self, defining_class: &str) -> MethodSignature {
        MethodSignature::new(
            defining_class,
            self.name.clone(),
            self.formals.clone(),
            self.returns.clone(),
        )
    }
}
