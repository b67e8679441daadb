use ffgen_types::BindingTag;

use std::fmt;

/// The four independent allocation namespaces.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, strum::Display)]
pub enum RegisterSpace {
    /// Scratch registers checked out from and released back to the temp free list.
    Temp,
    /// Primary attributes holding the incoming vertex.
    Input,
    /// Secondary attributes holding uniform state.
    Constant,
    Output,
}

/// A hardware index register used for runtime-indexed secondary access.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, strum::Display)]
pub enum IndexRegister {
    Low,
    High,
}

/// A handle to a run of words in exactly one register space.
///
/// Registers are plain values: narrowing one with [`Register::sub`] yields a view of the same
/// storage, and instructions hold their operands by value so a stored instruction keeps the
/// location the operand had when it was built.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Register {
    pub space: RegisterSpace,
    /// Offset in words. For indexed registers this is relative to the index register.
    pub offset: u32,
    /// Size in words.
    pub size: u32,
    pub binding: BindingTag,
    pub index: Option<IndexRegister>,
    /// Placed in the indexable secondary window and subject to compaction.
    pub indexable: bool,
}

impl Register {
    pub fn new(space: RegisterSpace, offset: u32, size: u32, binding: BindingTag) -> Self {
        Register {
            space,
            offset,
            size,
            binding,
            index: None,
            indexable: false,
        }
    }

    /// A view of `size` words starting `word` words into this register.
    pub fn sub(&self, word: u32, size: u32) -> Register {
        debug_assert!(
            word + size <= self.size,
            "view {word}+{size} outside {} words of {}",
            self.size,
            self.binding
        );
        Register {
            offset: self.offset + word,
            size,
            ..*self
        }
    }

    /// A single word of this register.
    pub fn at(&self, word: u32) -> Register {
        self.sub(word, 1)
    }

    /// The leading `size` words of this register.
    pub fn first(&self, size: u32) -> Register {
        self.sub(0, size)
    }

    pub fn is_temp(&self) -> bool {
        self.space == RegisterSpace::Temp
    }

    pub fn end(&self) -> u32 {
        self.offset + self.size
    }

    /// Whether writing one register may clobber the other.
    pub fn overlaps(&self, other: &Register) -> bool {
        if self.space != other.space {
            return false;
        }
        if self.index.is_some() || other.index.is_some() {
            return true;
        }
        self.offset < other.end() && other.offset < self.end()
    }
}

impl fmt::Display for Register {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let prefix = match self.space {
            RegisterSpace::Temp => "r",
            RegisterSpace::Input => "pa",
            RegisterSpace::Constant => "sa",
            RegisterSpace::Output => "o",
        };
        match self.index {
            Some(IndexRegister::Low) => write!(f, "{prefix}[il+{}]", self.offset)?,
            Some(IndexRegister::High) => write!(f, "{prefix}[ih+{}]", self.offset)?,
            None => write!(f, "{prefix}{}", self.offset)?,
        }
        if self.size > 1 {
            write!(f, ":{}", self.size)?;
        }
        Ok(())
    }
}
