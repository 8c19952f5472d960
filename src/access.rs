use bitflags::bitflags;

// Values match the dex access_flags encoding.
bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct AccessFlags: u32 {
        const PUBLIC = 0x1;
        const PRIVATE = 0x2;
        const PROTECTED = 0x4;
        const STATIC = 0x8;
        const FINAL = 0x10;
        const SYNCHRONIZED = 0x20;
        const VOLATILE = 0x40;
        const BRIDGE = 0x40;
        const TRANSIENT = 0x80;
        const VARARGS = 0x80;
        const NATIVE = 0x100;
        const INTERFACE = 0x200;
        const ABSTRACT = 0x400;
        const STRICT = 0x800;
        const SYNTHETIC = 0x1000;
        const ANNOTATION = 0x2000;
        const ENUM = 0x4000;
        const CONSTRUCTOR = 0x10000;
        const DECLARED_SYNCHRONIZED = 0x20000;
    }
}

impl AccessFlags {
    /// Maps a single smali modifier keyword, `None` for anything unknown.
    pub fn from_keyword(s: &str) -> Option<AccessFlags> {
        Some(match s {
            "public" => Self::PUBLIC,
            "private" => Self::PRIVATE,
            "protected" => Self::PROTECTED,
            "static" => Self::STATIC,
            "final" => Self::FINAL,
            "synchronized" => Self::SYNCHRONIZED,
            "volatile" => Self::VOLATILE,
            "bridge" => Self::BRIDGE,
            "transient" => Self::TRANSIENT,
            "varargs" => Self::VARARGS,
            "native" => Self::NATIVE,
            "interface" => Self::INTERFACE,
            "abstract" => Self::ABSTRACT,
            "strictfp" | "strict" => Self::STRICT,
            "synthetic" => Self::SYNTHETIC,
            "annotation" => Self::ANNOTATION,
            "enum" => Self::ENUM,
            "constructor" => Self::CONSTRUCTOR,
            "declared-synchronized" => Self::DECLARED_SYNCHRONIZED,
            _ => return None,
        })
    }

    /// Folds a modifier list. Unknown words are skipped, they still live on in the list itself.
    pub fn from_modifiers<S: AsRef<str>>(modifiers: &[S]) -> AccessFlags {
        modifiers
            .iter()
            .filter_map(|m| Self::from_keyword(m.as_ref()))
            .fold(AccessFlags::empty(), |acc, f| acc | f)
    }
}
