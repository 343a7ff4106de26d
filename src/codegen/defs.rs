//! Generic classfile-specific definitions

/// Header of Java class file (magic number)
pub const MAGIC: u32 = 0xCAFEBABE;

/// Name of a constructor
pub const CONSTRUCTOR_METHOD_NAME: &str = "<init>";

/// Name of the lambda deserialization dispatcher
pub const DESERIALIZE_LAMBDA_NAME: &str = "$deserializeLambda$";
pub const DESERIALIZE_LAMBDA_DESCRIPTOR: &str = "(Ljava/lang/invoke/SerializedLambda;)Ljava/lang/Object;";

/// JVM version constants
pub mod major_versions {
    pub const JAVA_8: u16 = 52;
    pub const JAVA_9: u16 = 53;
    pub const JAVA_11: u16 = 55;
    pub const JAVA_17: u16 = 61;
    pub const JAVA_21: u16 = 65;
}

/// Access flags for classes, fields and methods
pub mod access_flags {
    pub const ACC_PUBLIC: u16 = 0x0001;
    pub const ACC_PRIVATE: u16 = 0x0002;
    pub const ACC_PROTECTED: u16 = 0x0004;
    pub const ACC_STATIC: u16 = 0x0008;
    pub const ACC_FINAL: u16 = 0x0010;
    pub const ACC_SUPER: u16 = 0x0020;
    pub const ACC_SYNCHRONIZED: u16 = 0x0020;
    pub const ACC_BRIDGE: u16 = 0x0040;
    pub const ACC_INTERFACE: u16 = 0x0200;
    pub const ACC_ABSTRACT: u16 = 0x0400;
    pub const ACC_SYNTHETIC: u16 = 0x1000;
    pub const ACC_ENUM: u16 = 0x4000;
}

/// `java.lang.invoke.LambdaMetafactory` flag bits for `altMetafactory`
pub mod lambda_flags {
    pub const FLAG_SERIALIZABLE: i32 = 1;
    pub const FLAG_MARKERS: i32 = 2;
    pub const FLAG_BRIDGES: i32 = 4;
}
