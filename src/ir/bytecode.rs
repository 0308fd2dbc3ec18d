//! Bytecode intermediate representation
//!
//! A flat, typed stack IR. Each function compiles to a contiguous
//! instruction list plus a local slot table; jump operands are absolute
//! instruction indices within the function. Arithmetic comes in integer
//! and float variants chosen by statically tracked operand type, output
//! is by type, arrays are heap blocks with a leading length slot, and
//! struct fields are addressed by field index.

use std::fmt;

/// A bytecode operation
#[derive(Debug, Clone, PartialEq)]
pub enum Op {
    // ============ Stack ============
    PushInt(i64),
    PushFloat(f64),
    PushStr(String),
    PushChar(char),
    PushBool(bool),
    PushNull,
    Pop,
    Dup,

    // ============ Locals and globals ============
    LoadLocal(u16),
    StoreLocal(u16),
    LoadGlobal(String),
    StoreGlobal(String),
    AddrLocal(u16),
    AddrGlobal(String),

    // ============ Integer arithmetic ============
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Neg,
    /// Integer base and exponent, integer result
    Pow,

    // ============ Float arithmetic ============
    FAdd,
    FSub,
    FMul,
    FDiv,
    FMod,
    FNeg,
    /// Convert the integer on top of the stack to a float
    IntToFloat,

    // ============ Comparison (integer 0/1 result) ============
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Not,

    // ============ Control flow ============
    Jump(usize),
    JumpIfFalse(usize),
    JumpIfTrue(usize),

    // ============ Calls ============
    Call { name: String, argc: u8 },
    Return,
    ReturnValue,

    // ============ Output (by operand type) ============
    PrintInt,
    PrintFloat,
    PrintStr,
    PrintChar,
    PrintBool,
    PrintNewline,

    // ============ Input ============
    ReadInt,
    ReadFloat,
    ReadStr,
    ReadChar,

    // ============ Math builtins ============
    Sqrt,
    Abs,

    // ============ Arrays (length-tagged heap blocks) ============
    /// Pops a size, allocates a zeroed array of that length
    NewArray,
    /// Pops N values pushed in order, allocates an array of them
    ArrayLit(u32),
    /// Pops index then array, pushes the element
    ArrayGet,
    /// Pops value, index, array; stores the element
    ArraySet,
    /// Pops an array, pushes its length tag
    ArrayLen,

    // ============ Structures (by field index) ============
    /// Allocates a struct with N zeroed fields
    NewStruct(u32),
    /// Pops a struct reference, pushes the field
    FieldGet(u32),
    /// Pops value then struct reference; stores the field
    FieldSet(u32),

    // ============ Memory ============
    /// Pops an element count, pushes a fresh allocation
    Alloc,
    FreeMem,
    /// Pops an address, pushes the value at it
    LoadPtr,
    /// Pops value then address; stores through the pointer
    StorePtr,

    // ============ Misc ============
    /// Pops max then min, pushes a random integer in [min, max]
    Random,
    Halt,
    Nop,
}

impl fmt::Display for Op {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Op::PushInt(v) => write!(f, "PUSH_INT {}", v),
            Op::PushFloat(v) => write!(f, "PUSH_FLOAT {}", v),
            Op::PushStr(v) => write!(f, "PUSH_STR {:?}", v),
            Op::PushChar(v) => write!(f, "PUSH_CHAR {:?}", v),
            Op::PushBool(v) => write!(f, "PUSH_BOOL {}", if *v { "yes" } else { "no" }),
            Op::PushNull => write!(f, "PUSH_NULL"),
            Op::Pop => write!(f, "POP"),
            Op::Dup => write!(f, "DUP"),
            Op::LoadLocal(i) => write!(f, "LOAD_LOCAL {}", i),
            Op::StoreLocal(i) => write!(f, "STORE_LOCAL {}", i),
            Op::LoadGlobal(name) => write!(f, "LOAD_GLOBAL {}", name),
            Op::StoreGlobal(name) => write!(f, "STORE_GLOBAL {}", name),
            Op::AddrLocal(i) => write!(f, "ADDR_LOCAL {}", i),
            Op::AddrGlobal(name) => write!(f, "ADDR_GLOBAL {}", name),
            Op::Add => write!(f, "ADD"),
            Op::Sub => write!(f, "SUB"),
            Op::Mul => write!(f, "MUL"),
            Op::Div => write!(f, "DIV"),
            Op::Mod => write!(f, "MOD"),
            Op::Neg => write!(f, "NEG"),
            Op::Pow => write!(f, "POW"),
            Op::FAdd => write!(f, "FADD"),
            Op::FSub => write!(f, "FSUB"),
            Op::FMul => write!(f, "FMUL"),
            Op::FDiv => write!(f, "FDIV"),
            Op::FMod => write!(f, "FMOD"),
            Op::FNeg => write!(f, "FNEG"),
            Op::IntToFloat => write!(f, "INT_TO_FLOAT"),
            Op::Eq => write!(f, "EQ"),
            Op::Ne => write!(f, "NE"),
            Op::Lt => write!(f, "LT"),
            Op::Le => write!(f, "LE"),
            Op::Gt => write!(f, "GT"),
            Op::Ge => write!(f, "GE"),
            Op::Not => write!(f, "NOT"),
            Op::Jump(t) => write!(f, "JUMP {}", t),
            Op::JumpIfFalse(t) => write!(f, "JUMP_IF_FALSE {}", t),
            Op::JumpIfTrue(t) => write!(f, "JUMP_IF_TRUE {}", t),
            Op::Call { name, argc } => write!(f, "CALL {} {}", name, argc),
            Op::Return => write!(f, "RETURN"),
            Op::ReturnValue => write!(f, "RETURN_VALUE"),
            Op::PrintInt => write!(f, "PRINT_INT"),
            Op::PrintFloat => write!(f, "PRINT_FLOAT"),
            Op::PrintStr => write!(f, "PRINT_STR"),
            Op::PrintChar => write!(f, "PRINT_CHAR"),
            Op::PrintBool => write!(f, "PRINT_BOOL"),
            Op::PrintNewline => write!(f, "PRINT_NEWLINE"),
            Op::ReadInt => write!(f, "READ_INT"),
            Op::ReadFloat => write!(f, "READ_FLOAT"),
            Op::ReadStr => write!(f, "READ_STR"),
            Op::ReadChar => write!(f, "READ_CHAR"),
            Op::Sqrt => write!(f, "SQRT"),
            Op::Abs => write!(f, "ABS"),
            Op::NewArray => write!(f, "NEW_ARRAY"),
            Op::ArrayLit(n) => write!(f, "ARRAY_LIT {}", n),
            Op::ArrayGet => write!(f, "ARRAY_GET"),
            Op::ArraySet => write!(f, "ARRAY_SET"),
            Op::ArrayLen => write!(f, "ARRAY_LEN"),
            Op::NewStruct(n) => write!(f, "NEW_STRUCT {}", n),
            Op::FieldGet(i) => write!(f, "FIELD_GET {}", i),
            Op::FieldSet(i) => write!(f, "FIELD_SET {}", i),
            Op::Alloc => write!(f, "ALLOC"),
            Op::FreeMem => write!(f, "FREE"),
            Op::LoadPtr => write!(f, "LOAD_PTR"),
            Op::StorePtr => write!(f, "STORE_PTR"),
            Op::Random => write!(f, "RANDOM"),
            Op::Halt => write!(f, "HALT"),
            Op::Nop => write!(f, "NOP"),
        }
    }
}

/// A single instruction with its source line for diagnostics
#[derive(Debug, Clone, PartialEq)]
pub struct Instr {
    pub op: Op,
    pub line: u32,
}

impl Instr {
    pub fn new(op: Op, line: u32) -> Self {
        Self { op, line }
    }
}

/// A compiled function: a contiguous instruction list plus a local slot
/// table (parameters occupy the first slots).
#[derive(Debug, Clone)]
pub struct Function {
    pub name: String,
    pub params: Vec<String>,
    pub locals: u16,
    pub code: Vec<Instr>,
    pub is_main: bool,
}

/// A struct layout: field names in declaration order; the position is
/// the field index used by `FieldGet`/`FieldSet`.
#[derive(Debug, Clone)]
pub struct StructLayout {
    pub name: String,
    pub fields: Vec<String>,
}

impl StructLayout {
    pub fn field_index(&self, field: &str) -> Option<u32> {
        self.fields.iter().position(|f| f == field).map(|i| i as u32)
    }
}

/// A complete compiled program
#[derive(Debug, Clone, Default)]
pub struct Program {
    pub functions: Vec<Function>,
    pub structs: Vec<StructLayout>,
}

impl Program {
    pub fn function(&self, name: &str) -> Option<&Function> {
        self.functions.iter().find(|f| f.name == name)
    }

    pub fn layout(&self, name: &str) -> Option<&StructLayout> {
        self.structs.iter().find(|s| s.name == name)
    }

    /// Human-readable disassembly, used by `--disassemble`.
    pub fn disassemble(&self) -> String {
        let mut out = String::from("=== Zinc Bytecode Disassembly ===\n");

        if !self.structs.is_empty() {
            out.push_str("\n--- Structs ---\n");
            for layout in &self.structs {
                out.push_str(&format!("struct {}:\n", layout.name));
                for (i, field) in layout.fields.iter().enumerate() {
                    out.push_str(&format!("  {:2}: {}\n", i, field));
                }
            }
        }

        out.push_str("\n--- Functions ---\n");
        for func in &self.functions {
            out.push_str(&format!(
                "\nfunction {}({}) [{} locals]:\n",
                func.name,
                func.params.join(", "),
                func.locals
            ));
            for (i, instr) in func.code.iter().enumerate() {
                out.push_str(&format!("  {:4}: {}\n", i, instr.op));
            }
        }

        out
    }
}

impl fmt::Display for Program {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.disassemble())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disassembly_format() {
        let program = Program {
            functions: vec![Function {
                name: "main".into(),
                params: vec![],
                locals: 1,
                code: vec![
                    Instr::new(Op::PushInt(5), 1),
                    Instr::new(Op::StoreLocal(0), 1),
                    Instr::new(Op::PushInt(0), 2),
                    Instr::new(Op::ReturnValue, 2),
                ],
                is_main: true,
            }],
            structs: vec![StructLayout {
                name: "Person".into(),
                fields: vec!["name".into(), "age".into()],
            }],
        };
        let text = program.disassemble();
        assert!(text.contains("function main()"));
        assert!(text.contains("PUSH_INT 5"));
        assert!(text.contains("STORE_LOCAL 0"));
        assert!(text.contains("struct Person:"));
    }

    #[test]
    fn test_field_index() {
        let layout = StructLayout {
            name: "Point".into(),
            fields: vec!["x".into(), "y".into()],
        };
        assert_eq!(layout.field_index("y"), Some(1));
        assert_eq!(layout.field_index("z"), None);
    }
}
