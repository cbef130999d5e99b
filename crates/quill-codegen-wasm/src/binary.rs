//! Typed records for each structural unit of a binary module. Every record
//! knows how to encode itself; [`BinaryModule::encode`] emits the header and
//! the non-empty sections in their fixed order.

use quill_syntax::DataType;

use crate::writer::Writer;

pub const MAGIC: [u8; 4] = *b"\0asm";
pub const VERSION: [u8; 4] = [0x01, 0x00, 0x00, 0x00];

/// Section ids, in the order they must appear
pub mod section {
    pub const CUSTOM: u8 = 0;
    pub const TYPE: u8 = 1;
    pub const IMPORT: u8 = 2;
    pub const FUNCTION: u8 = 3;
    pub const MEMORY: u8 = 5;
    pub const GLOBAL: u8 = 6;
    pub const EXPORT: u8 = 7;
    pub const START: u8 = 8;
    pub const CODE: u8 = 10;
}

pub trait Encode {
    fn encode(&self, w: &mut Writer);
}

impl<T: Encode> Encode for [T] {
    fn encode(&self, w: &mut Writer) {
        w.u32(self.len() as u32);
        for item in self {
            item.encode(w);
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValType {
    I32,
    I64,
    F32,
    F64,
}

impl ValType {
    /// VM representation of a scalar source type
    pub fn of(ty: &DataType) -> Option<ValType> {
        match ty {
            DataType::Int | DataType::UInt | DataType::Bool => Some(ValType::I32),
            DataType::Long | DataType::ULong => Some(ValType::I64),
            DataType::Float => Some(ValType::F32),
            DataType::Double => Some(ValType::F64),
            _ => None,
        }
    }

    pub fn code(self) -> u8 {
        match self {
            ValType::I32 => 0x7F,
            ValType::I64 => 0x7E,
            ValType::F32 => 0x7D,
            ValType::F64 => 0x7C,
        }
    }

    /// Width in bytes
    pub fn size(self) -> u32 {
        match self {
            ValType::I32 | ValType::F32 => 4,
            ValType::I64 | ValType::F64 => 8,
        }
    }
}

impl Encode for ValType {
    fn encode(&self, w: &mut Writer) {
        w.byte(self.code());
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct FuncType {
    pub params: Vec<ValType>,
    pub results: Vec<ValType>,
}

impl Encode for FuncType {
    fn encode(&self, w: &mut Writer) {
        w.byte(0x60);
        self.params.encode(w);
        self.results.encode(w);
    }
}

/// Resizable limits, in 64 KiB pages for memories
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Limits {
    pub min: u32,
    pub max: Option<u32>,
}

impl Encode for Limits {
    fn encode(&self, w: &mut Writer) {
        match self.max {
            Some(max) => w.byte(0x01).u32(self.min).u32(max),
            None => w.byte(0x00).u32(self.min),
        };
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GlobalType {
    pub val_type: ValType,
    pub mutable: bool,
}

impl Encode for GlobalType {
    fn encode(&self, w: &mut Writer) {
        self.val_type.encode(w);
        w.byte(u8::from(self.mutable));
    }
}

/// Constant initializer expression
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum InitExpr {
    I32(i32),
    I64(i64),
    F32(f32),
    F64(f64),
}

impl InitExpr {
    pub fn zero(val_type: ValType) -> Self {
        match val_type {
            ValType::I32 => InitExpr::I32(0),
            ValType::I64 => InitExpr::I64(0),
            ValType::F32 => InitExpr::F32(0.0),
            ValType::F64 => InitExpr::F64(0.0),
        }
    }

    pub fn val_type(self) -> ValType {
        match self {
            InitExpr::I32(_) => ValType::I32,
            InitExpr::I64(_) => ValType::I64,
            InitExpr::F32(_) => ValType::F32,
            InitExpr::F64(_) => ValType::F64,
        }
    }

    pub fn negate(self) -> Self {
        match self {
            InitExpr::I32(v) => InitExpr::I32(v.wrapping_neg()),
            InitExpr::I64(v) => InitExpr::I64(v.wrapping_neg()),
            InitExpr::F32(v) => InitExpr::F32(-v),
            InitExpr::F64(v) => InitExpr::F64(-v),
        }
    }

    /// The constant instruction alone, without the terminating `end`
    pub fn encode_instruction(&self, w: &mut Writer) {
        match *self {
            InitExpr::I32(v) => w.byte(0x41).s32(v),
            InitExpr::I64(v) => w.byte(0x42).s64(v),
            InitExpr::F32(v) => w.byte(0x43).f32(v),
            InitExpr::F64(v) => w.byte(0x44).f64(v),
        };
    }
}

impl Encode for InitExpr {
    fn encode(&self, w: &mut Writer) {
        self.encode_instruction(w);
        w.byte(0x0B);
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ImportDesc {
    /// Type index of the imported function
    Function(u32),
    Memory(Limits),
    Global(GlobalType),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Import {
    pub module: String,
    pub field: String,
    pub desc: ImportDesc,
}

impl Encode for Import {
    fn encode(&self, w: &mut Writer) {
        w.string(&self.module).string(&self.field);
        match &self.desc {
            ImportDesc::Function(type_index) => {
                w.byte(0x00).u32(*type_index);
            }
            ImportDesc::Memory(limits) => {
                w.byte(0x02);
                limits.encode(w);
            }
            ImportDesc::Global(ty) => {
                w.byte(0x03);
                ty.encode(w);
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Global {
    pub ty: GlobalType,
    pub init: InitExpr,
}

impl Encode for Global {
    fn encode(&self, w: &mut Writer) {
        self.ty.encode(w);
        self.init.encode(w);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportKind {
    Function = 0x00,
    Memory = 0x02,
    Global = 0x03,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Export {
    pub name: String,
    pub kind: ExportKind,
    pub index: u32,
}

impl Encode for Export {
    fn encode(&self, w: &mut Writer) {
        w.string(&self.name).byte(self.kind as u8).u32(self.index);
    }
}

/// Locals beyond the parameters plus the instruction stream (ending in
/// `end`). Runs of equal local types are compressed on encode.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct FunctionBody {
    pub locals: Vec<ValType>,
    pub code: Vec<u8>,
}

impl Encode for FunctionBody {
    fn encode(&self, w: &mut Writer) {
        let mut runs: Vec<(u32, ValType)> = Vec::new();
        for &local in &self.locals {
            match runs.last_mut() {
                Some((count, ty)) if *ty == local => *count += 1,
                _ => runs.push((1, local)),
            }
        }
        let mut body = Writer::new();
        body.u32(runs.len() as u32);
        for (count, ty) in runs {
            body.u32(count);
            ty.encode(&mut body);
        }
        body.bytes(&self.code);
        w.sized(&body);
    }
}

/// Debug names: the custom `name` section
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct NameSection {
    pub module: Option<String>,
    /// (function index, name), ascending by index
    pub functions: Vec<(u32, String)>,
    /// (function index, [(local index, name)]), ascending by index
    pub locals: Vec<(u32, Vec<(u32, String)>)>,
}

impl NameSection {
    fn name_map(w: &mut Writer, entries: &[(u32, String)]) {
        w.u32(entries.len() as u32);
        for (index, name) in entries {
            w.u32(*index).string(name);
        }
    }
}

impl Encode for NameSection {
    fn encode(&self, w: &mut Writer) {
        w.string("name");
        if let Some(module) = &self.module {
            let mut sub = Writer::new();
            sub.string(module);
            w.byte(0).sized(&sub);
        }
        if !self.functions.is_empty() {
            let mut sub = Writer::new();
            Self::name_map(&mut sub, &self.functions);
            w.byte(1).sized(&sub);
        }
        if !self.locals.is_empty() {
            let mut sub = Writer::new();
            sub.u32(self.locals.len() as u32);
            for (function, names) in &self.locals {
                sub.u32(*function);
                Self::name_map(&mut sub, names);
            }
            w.byte(2).sized(&sub);
        }
    }
}

/// A section: id byte followed by its length-prefixed payload
#[derive(Debug, Clone)]
pub struct Section {
    pub id: u8,
    pub payload: Writer,
}

impl Section {
    pub fn new(id: u8) -> Self {
        Self {
            id,
            payload: Writer::new(),
        }
    }

    pub fn of<T: Encode + ?Sized>(id: u8, content: &T) -> Self {
        let mut section = Section::new(id);
        content.encode(&mut section.payload);
        section
    }
}

impl Encode for Section {
    fn encode(&self, w: &mut Writer) {
        w.byte(self.id).sized(&self.payload);
    }
}

/// Everything that goes into one output module
#[derive(Debug, Clone, Default)]
pub struct BinaryModule {
    pub types: Vec<FuncType>,
    pub imports: Vec<Import>,
    /// Type index of each locally defined function
    pub functions: Vec<u32>,
    pub memory: Option<Limits>,
    pub globals: Vec<Global>,
    pub exports: Vec<Export>,
    pub start: Option<u32>,
    pub code: Vec<FunctionBody>,
    pub names: Option<NameSection>,
}

impl BinaryModule {
    pub fn new() -> Self {
        Self::default()
    }

    /// Index of `ty` in the type table, adding it on first use
    pub fn add_type(&mut self, ty: FuncType) -> u32 {
        if let Some(index) = self.types.iter().position(|t| *t == ty) {
            return index as u32;
        }
        self.types.push(ty);
        (self.types.len() - 1) as u32
    }

    pub fn imported_functions(&self) -> u32 {
        self.imports
            .iter()
            .filter(|i| matches!(i.desc, ImportDesc::Function(_)))
            .count() as u32
    }

    pub fn imported_globals(&self) -> u32 {
        self.imports
            .iter()
            .filter(|i| matches!(i.desc, ImportDesc::Global(_)))
            .count() as u32
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut sections = Vec::new();
        if !self.types.is_empty() {
            sections.push(Section::of(section::TYPE, self.types.as_slice()));
        }
        if !self.imports.is_empty() {
            sections.push(Section::of(section::IMPORT, self.imports.as_slice()));
        }
        if !self.functions.is_empty() {
            let mut s = Section::new(section::FUNCTION);
            s.payload.u32(self.functions.len() as u32);
            for &type_index in &self.functions {
                s.payload.u32(type_index);
            }
            sections.push(s);
        }
        if let Some(limits) = &self.memory {
            sections.push(Section::of(section::MEMORY, std::slice::from_ref(limits)));
        }
        if !self.globals.is_empty() {
            sections.push(Section::of(section::GLOBAL, self.globals.as_slice()));
        }
        if !self.exports.is_empty() {
            sections.push(Section::of(section::EXPORT, self.exports.as_slice()));
        }
        if let Some(start) = self.start {
            let mut s = Section::new(section::START);
            s.payload.u32(start);
            sections.push(s);
        }
        if !self.code.is_empty() {
            sections.push(Section::of(section::CODE, self.code.as_slice()));
        }
        if let Some(names) = &self.names {
            sections.push(Section::of(section::CUSTOM, names));
        }

        let mut w = Writer::new();
        w.bytes(&MAGIC).bytes(&VERSION);
        for s in &sections {
            s.encode(&mut w);
        }
        log::debug!(
            "encoded module: {} section(s), {} byte(s)",
            sections.len(),
            w.len()
        );
        w.into_bytes()
    }
}
