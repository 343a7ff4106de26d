// Global safety caps to prevent pathological or infinite loops

// Hierarchy walks: BFS over supertypes and sealed permits expansion
pub const HIERARCHY_MAX_BFS_STEPS: usize = 200_000;
pub const SEALED_MAX_EXPANSION_DEPTH: usize = 64;

// Record-pattern coverage recursion (nested components)
pub const RECORD_COVERAGE_MAX_DEPTH: usize = 32;

// Verify: signature parser and related scanners
pub const VERIFY_MAX_SIGNATURE_ITERS: usize = 200_000;

// Public methods of java.lang.Object; an interface redeclaring them stays functional
pub const OBJECT_PUBLIC_METHODS: &[(&str, &str)] = &[
    ("equals", "(Ljava/lang/Object;)Z"),
    ("hashCode", "()I"),
    ("toString", "()Ljava/lang/String;"),
];

pub const OBJECT: &str = "java/lang/Object";
pub const STRING: &str = "java/lang/String";
pub const SERIALIZABLE: &str = "java/io/Serializable";
pub const ENUM: &str = "java/lang/Enum";
pub const RECORD: &str = "java/lang/Record";

// makeConcatWithConstants accepts at most this many argument slots
pub const STRING_CONCAT_MAX_ARGS: usize = 200;
