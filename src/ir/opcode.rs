//! The LIR instruction set and its static metadata.
//!
//! Each opcode knows its textual name, the kind of value it produces, and
//! which arity class the assembler dispatches it through. Everything else
//! (operand counts, literal shapes) follows from the arity class.

use super::types::ValueKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Opcode {
    // Structural.
    Start,
    RegFence,
    Label,
    Skip,
    File,
    Line,
    Jtbl,

    // Parameters and stack allocation.
    ParamI,
    ParamQ,
    AllocP,

    // Immediates.
    ImmI,
    ImmQ,
    ImmD,
    ImmF,
    ImmF4,

    // Liveness hints.
    LiveI,
    LiveQ,
    LiveD,
    LiveF,
    LiveF4,

    // Unary arithmetic.
    NegI,
    NotI,
    NegD,
    NegF,
    NegF4,
    /// Remainder of the division instruction given as its operand.
    ModI,

    // Conversions and bitcasts.
    Dlo2I,
    Dhi2I,
    Q2I,
    I2Q,
    UI2UQ,
    DasQ,
    QasD,
    I2D,
    UI2D,
    I2F,
    UI2F,
    D2I,
    F2I,
    F2D,
    D2F,
    F2F4,
    F4X,
    F4Y,
    F4Z,
    F4W,
    /// Builds a double from two 32-bit halves (low, high).
    II2D,

    // Integer binary.
    AddI,
    SubI,
    MulI,
    DivI,
    AndI,
    OrI,
    XorI,
    LshI,
    RshI,
    RshUI,

    // Quad binary.
    AddQ,
    SubQ,
    AndQ,
    OrQ,
    XorQ,
    LshQ,
    RshQ,
    RshUQ,

    // Double binary.
    AddD,
    SubD,
    MulD,
    DivD,

    // Float binary.
    AddF,
    SubF,
    MulF,
    DivF,

    // Packed-float binary.
    AddF4,
    SubF4,
    MulF4,
    DivF4,

    // Integer comparisons.
    EqI,
    LtI,
    GtI,
    LeI,
    GeI,
    LtUI,
    GtUI,
    LeUI,
    GeUI,

    // Quad comparisons.
    EqQ,
    LtQ,
    GtQ,
    LeQ,
    GeQ,
    LtUQ,
    GtUQ,
    LeUQ,
    GeUQ,

    // Double comparisons.
    EqD,
    LtD,
    GtD,
    LeD,
    GeD,

    // Float comparisons.
    EqF,
    LtF,
    GtF,
    LeF,
    GeF,
    EqF4,

    // Conditional moves.
    CmovI,
    CmovQ,
    CmovD,
    CmovF,
    CmovF4,

    // Branches.
    J,
    Jt,
    Jf,

    // Overflow-checked arithmetic that branches on overflow.
    AddJovI,
    SubJovI,
    MulJovI,
    AddJovQ,
    SubJovQ,

    // Overflow-checked arithmetic that exits through a guard on overflow.
    AddXovI,
    SubXovI,
    MulXovI,

    // Guards.
    X,
    Xt,
    Xf,
    XBarrier,

    // Loads.
    LdI,
    LdQ,
    LdD,
    LdF,
    LdF4,
    LdUC2UI,
    LdUS2UI,
    LdC2I,
    LdS2I,
    LdF2D,

    // Stores.
    StI,
    StQ,
    StD,
    StF,
    StF4,
    StI2C,
    StI2S,
    StD2F,

    // Calls, selected by return kind.
    CallV,
    CallI,
    CallQ,
    CallD,
    CallF,
    CallF4,

    // Returns.
    RetI,
    RetQ,
    RetD,
    RetF,
    RetF4,
}

/// How the fragment assembler consumes the operand tokens of an opcode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArityClass {
    /// No operands (`start`, `regfence`).
    None,
    /// `label` both emits a node and binds a jump label.
    Label,
    /// One value operand (liveness hints, unary arithmetic, conversions,
    /// returns).
    Unary,
    /// Two value operands.
    Binary,
    /// Three value operands (`cmov*`, `ii2d` is Binary).
    Ternary,
    /// One literal: `immi`, `immq`, `immd`, `immf`, `allocp`.
    Immediate,
    /// Four scalar literals (`immf4`).
    ImmediateF4,
    /// Two literals: parameter index and parameter kind.
    Param,
    /// Base value plus literal displacement.
    Load,
    /// Value, base, literal displacement.
    Store,
    /// `j`/`jt`/`jf`: optional condition plus a label token.
    Jump,
    /// `*jov*`: two values plus a label token.
    JumpOv,
    /// `x`/`xt`/`xf`/`xbarrier`: optional condition, fresh side exit.
    Guard,
    /// `*xov*`: two values, fresh side exit.
    GuardOv,
    /// Callee name, ABI name, then arguments.
    Call,
    /// Rejected in textual IR (`start`, `skip`, `file`, `line`, `jtbl`).
    Rejected,
}

impl Opcode {
    pub fn name(self) -> &'static str {
        use Opcode::*;
        match self {
            Start => "start",
            RegFence => "regfence",
            Label => "label",
            Skip => "skip",
            File => "file",
            Line => "line",
            Jtbl => "jtbl",
            ParamI => "parami",
            ParamQ => "paramq",
            AllocP => "allocp",
            ImmI => "immi",
            ImmQ => "immq",
            ImmD => "immd",
            ImmF => "immf",
            ImmF4 => "immf4",
            LiveI => "livei",
            LiveQ => "liveq",
            LiveD => "lived",
            LiveF => "livef",
            LiveF4 => "livef4",
            NegI => "negi",
            NotI => "noti",
            NegD => "negd",
            NegF => "negf",
            NegF4 => "negf4",
            ModI => "modi",
            Dlo2I => "dlo2i",
            Dhi2I => "dhi2i",
            Q2I => "q2i",
            I2Q => "i2q",
            UI2UQ => "ui2uq",
            DasQ => "dasq",
            QasD => "qasd",
            I2D => "i2d",
            UI2D => "ui2d",
            I2F => "i2f",
            UI2F => "ui2f",
            D2I => "d2i",
            F2I => "f2i",
            F2D => "f2d",
            D2F => "d2f",
            F2F4 => "f2f4",
            F4X => "f4x",
            F4Y => "f4y",
            F4Z => "f4z",
            F4W => "f4w",
            II2D => "ii2d",
            AddI => "addi",
            SubI => "subi",
            MulI => "muli",
            DivI => "divi",
            AndI => "andi",
            OrI => "ori",
            XorI => "xori",
            LshI => "lshi",
            RshI => "rshi",
            RshUI => "rshui",
            AddQ => "addq",
            SubQ => "subq",
            AndQ => "andq",
            OrQ => "orq",
            XorQ => "xorq",
            LshQ => "lshq",
            RshQ => "rshq",
            RshUQ => "rshuq",
            AddD => "addd",
            SubD => "subd",
            MulD => "muld",
            DivD => "divd",
            AddF => "addf",
            SubF => "subf",
            MulF => "mulf",
            DivF => "divf",
            AddF4 => "addf4",
            SubF4 => "subf4",
            MulF4 => "mulf4",
            DivF4 => "divf4",
            EqI => "eqi",
            LtI => "lti",
            GtI => "gti",
            LeI => "lei",
            GeI => "gei",
            LtUI => "ltui",
            GtUI => "gtui",
            LeUI => "leui",
            GeUI => "geui",
            EqQ => "eqq",
            LtQ => "ltq",
            GtQ => "gtq",
            LeQ => "leq",
            GeQ => "geq",
            LtUQ => "ltuq",
            GtUQ => "gtuq",
            LeUQ => "leuq",
            GeUQ => "geuq",
            EqD => "eqd",
            LtD => "ltd",
            GtD => "gtd",
            LeD => "led",
            GeD => "ged",
            EqF => "eqf",
            LtF => "ltf",
            GtF => "gtf",
            LeF => "lef",
            GeF => "gef",
            EqF4 => "eqf4",
            CmovI => "cmovi",
            CmovQ => "cmovq",
            CmovD => "cmovd",
            CmovF => "cmovf",
            CmovF4 => "cmovf4",
            J => "j",
            Jt => "jt",
            Jf => "jf",
            AddJovI => "addjovi",
            SubJovI => "subjovi",
            MulJovI => "muljovi",
            AddJovQ => "addjovq",
            SubJovQ => "subjovq",
            AddXovI => "addxovi",
            SubXovI => "subxovi",
            MulXovI => "mulxovi",
            X => "x",
            Xt => "xt",
            Xf => "xf",
            XBarrier => "xbarrier",
            LdI => "ldi",
            LdQ => "ldq",
            LdD => "ldd",
            LdF => "ldf",
            LdF4 => "ldf4",
            LdUC2UI => "lduc2ui",
            LdUS2UI => "ldus2ui",
            LdC2I => "ldc2i",
            LdS2I => "lds2i",
            LdF2D => "ldf2d",
            StI => "sti",
            StQ => "stq",
            StD => "std",
            StF => "stf",
            StF4 => "stf4",
            StI2C => "sti2c",
            StI2S => "sti2s",
            StD2F => "std2f",
            CallV => "callv",
            CallI => "calli",
            CallQ => "callq",
            CallD => "calld",
            CallF => "callf",
            CallF4 => "callf4",
            RetI => "reti",
            RetQ => "retq",
            RetD => "retd",
            RetF => "retf",
            RetF4 => "retf4",
        }
    }

    /// Kind of the value this opcode produces.
    pub fn result_kind(self) -> ValueKind {
        use Opcode::*;
        match self {
            ImmI | NegI | NotI | ModI | AddI | SubI | MulI | DivI | AndI | OrI | XorI | LshI
            | RshI | RshUI | EqI | LtI | GtI | LeI | GeI | LtUI | GtUI | LeUI | GeUI | EqQ
            | LtQ | GtQ | LeQ | GeQ | LtUQ | GtUQ | LeUQ | GeUQ | EqD | LtD | GtD | LeD | GeD
            | EqF | LtF | GtF | LeF | GeF | EqF4 | Dlo2I | Dhi2I | Q2I | D2I | F2I
            | CmovI | CallI | AddXovI | SubXovI | MulXovI | AddJovI
            | SubJovI | MulJovI | LdI | LdUC2UI | LdUS2UI | LdC2I | LdS2I | ParamI => {
                ValueKind::I32
            }
            ImmQ | AddQ | SubQ | AndQ | OrQ | XorQ | LshQ | RshQ | RshUQ | I2Q | UI2UQ
            | DasQ | CmovQ | CallQ | AddJovQ | SubJovQ | LdQ | ParamQ => ValueKind::I64,
            ImmD | NegD | AddD | SubD | MulD | DivD | I2D | UI2D | F2D | QasD | II2D | CmovD
            | CallD | LdD | LdF2D => ValueKind::F64,
            ImmF | NegF | AddF | SubF | MulF | DivF | I2F | UI2F | D2F | F4X | F4Y | F4Z
            | F4W | CmovF | CallF | LdF => {
                ValueKind::F32
            }
            ImmF4 | NegF4 | AddF4 | SubF4 | MulF4 | DivF4 | F2F4 | CmovF4 | CallF4 | LdF4 => {
                ValueKind::F4
            }
            AllocP => ValueKind::Ptr,
            Start | RegFence | Label | Skip | File | Line | Jtbl | LiveI | LiveQ | LiveD
            | LiveF | LiveF4 | J | Jt | Jf | X | Xt | Xf | XBarrier | StI | StQ | StD | StF
            | StF4 | StI2C | StI2S | StD2F | CallV | RetI | RetQ | RetD | RetF | RetF4 => {
                ValueKind::Void
            }
        }
    }

    /// How the assembler consumes this opcode's operand tokens.
    pub fn arity_class(self) -> ArityClass {
        use Opcode::*;
        match self {
            RegFence => ArityClass::None,
            Label => ArityClass::Label,
            LiveI | LiveQ | LiveD | LiveF | LiveF4 | NegI | NotI | NegD | NegF | NegF4 | ModI
            | Dlo2I | Dhi2I | Q2I | I2Q | UI2UQ | DasQ | QasD | I2D | UI2D | I2F | UI2F | D2I
            | F2I | F2D | D2F | F2F4 | F4X | F4Y | F4Z | F4W | RetI | RetQ | RetD | RetF
            | RetF4 => ArityClass::Unary,
            II2D | AddI | SubI | MulI | DivI | AndI | OrI | XorI | LshI | RshI | RshUI | AddQ
            | SubQ | AndQ | OrQ | XorQ | LshQ | RshQ | RshUQ | AddD | SubD | MulD | DivD
            | AddF | SubF | MulF | DivF | AddF4 | SubF4 | MulF4 | DivF4 | EqI | LtI | GtI
            | LeI | GeI | LtUI | GtUI | LeUI | GeUI | EqQ | LtQ | GtQ | LeQ | GeQ | LtUQ
            | GtUQ | LeUQ | GeUQ | EqD | LtD | GtD | LeD | GeD | EqF | LtF | GtF | LeF | GeF
            | EqF4 => ArityClass::Binary,
            CmovI | CmovQ | CmovD | CmovF | CmovF4 => ArityClass::Ternary,
            ImmI | ImmQ | ImmD | ImmF | AllocP => ArityClass::Immediate,
            ImmF4 => ArityClass::ImmediateF4,
            ParamI | ParamQ => ArityClass::Param,
            LdI | LdQ | LdD | LdF | LdF4 | LdUC2UI | LdUS2UI | LdC2I | LdS2I | LdF2D => {
                ArityClass::Load
            }
            StI | StQ | StD | StF | StF4 | StI2C | StI2S | StD2F => ArityClass::Store,
            J | Jt | Jf => ArityClass::Jump,
            AddJovI | SubJovI | MulJovI | AddJovQ | SubJovQ => ArityClass::JumpOv,
            X | Xt | Xf | XBarrier => ArityClass::Guard,
            AddXovI | SubXovI | MulXovI => ArityClass::GuardOv,
            CallV | CallI | CallQ | CallD | CallF | CallF4 => ArityClass::Call,
            Start | Skip | File | Line | Jtbl => ArityClass::Rejected,
        }
    }

    pub fn is_cmp(self) -> bool {
        use Opcode::*;
        matches!(
            self,
            EqI | LtI
                | GtI
                | LeI
                | GeI
                | LtUI
                | GtUI
                | LeUI
                | GeUI
                | EqQ
                | LtQ
                | GtQ
                | LeQ
                | GeQ
                | LtUQ
                | GtUQ
                | LeUQ
                | GeUQ
                | EqD
                | LtD
                | GtD
                | LeD
                | GeD
                | EqF
                | LtF
                | GtF
                | LeF
                | GeF
                | EqF4
        )
    }

    pub fn is_guard(self) -> bool {
        use Opcode::*;
        matches!(self, X | Xt | Xf | XBarrier | AddXovI | SubXovI | MulXovI)
    }

    /// Operand order is insensitive for CSE purposes.
    pub fn is_commutative(self) -> bool {
        use Opcode::*;
        matches!(
            self,
            AddI | MulI | AndI | OrI | XorI | EqI | AddQ | AndQ | OrQ | XorQ | EqQ
        )
    }

    /// Every opcode, in table order. Drives name-table construction.
    pub const ALL: &'static [Opcode] = {
        use Opcode::*;
        &[
            Start, RegFence, Label, Skip, File, Line, Jtbl, ParamI, ParamQ, AllocP, ImmI,
            ImmQ, ImmD, ImmF, ImmF4, LiveI, LiveQ, LiveD, LiveF, LiveF4, NegI, NotI, NegD,
            NegF, NegF4, ModI, Dlo2I, Dhi2I, Q2I, I2Q, UI2UQ, DasQ, QasD, I2D, UI2D, I2F,
            UI2F, D2I, F2I, F2D, D2F, F2F4, F4X, F4Y, F4Z, F4W, II2D, AddI, SubI, MulI, DivI,
            AndI, OrI, XorI, LshI, RshI, RshUI, AddQ, SubQ, AndQ, OrQ, XorQ, LshQ, RshQ,
            RshUQ, AddD, SubD, MulD, DivD, AddF, SubF, MulF, DivF, AddF4, SubF4, MulF4,
            DivF4, EqI, LtI, GtI, LeI, GeI, LtUI, GtUI, LeUI, GeUI, EqQ, LtQ, GtQ, LeQ, GeQ,
            LtUQ, GtUQ, LeUQ, GeUQ, EqD, LtD, GtD, LeD, GeD, EqF, LtF, GtF, LeF, GeF, EqF4,
            CmovI, CmovQ, CmovD, CmovF, CmovF4, J, Jt, Jf, AddJovI, SubJovI, MulJovI,
            AddJovQ, SubJovQ, AddXovI, SubXovI, MulXovI, X, Xt, Xf, XBarrier, LdI, LdQ, LdD,
            LdF, LdF4, LdUC2UI, LdUS2UI, LdC2I, LdS2I, LdF2D, StI, StQ, StD, StF, StF4,
            StI2C, StI2S, StD2F, CallV, CallI, CallQ, CallD, CallF, CallF4, RetI, RetQ,
            RetD, RetF, RetF4,
        ]
    };
}

impl std::fmt::Display for Opcode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Builds the name → opcode table used by the program driver, including the
/// pointer-sized aliases.
pub fn opcode_table() -> std::collections::HashMap<&'static str, Opcode> {
    let mut map = std::collections::HashMap::new();
    for &op in Opcode::ALL {
        map.insert(op.name(), op);
    }
    #[cfg(target_pointer_width = "64")]
    {
        map.insert("paramp", Opcode::ParamQ);
        map.insert("livep", Opcode::LiveQ);
    }
    #[cfg(not(target_pointer_width = "64"))]
    {
        map.insert("paramp", Opcode::ParamI);
        map.insert("livep", Opcode::LiveI);
    }
    map
}
