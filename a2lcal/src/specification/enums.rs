// every enumerated field of the a2l grammar is a fixed set of keywords
macro_rules! a2l_enum {
    ($(#[$meta:meta])* $name:ident { $($variant:ident => $text:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub fn from_a2l(text: &str) -> Option<Self> {
                match text {
                    $($text => Some(Self::$variant),)+
                    _ => None,
                }
            }

            pub fn name(&self) -> &'static str {
                match self {
                    $(Self::$variant => $text,)+
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.name())
            }
        }
    };
}

a2l_enum!(
    /// the data type of a value in ECU memory
    DataType {
        Ubyte => "UBYTE",
        Sbyte => "SBYTE",
        Uword => "UWORD",
        Sword => "SWORD",
        Ulong => "ULONG",
        Slong => "SLONG",
        AUint64 => "A_UINT64",
        AInt64 => "A_INT64",
        Float16Ieee => "FLOAT16_IEEE",
        Float32Ieee => "FLOAT32_IEEE",
        Float64Ieee => "FLOAT64_IEEE",
    }
);

impl DataType {
    /// size of the data type in bytes
    pub fn size(&self) -> usize {
        match self {
            DataType::Ubyte | DataType::Sbyte => 1,
            DataType::Uword | DataType::Sword | DataType::Float16Ieee => 2,
            DataType::Ulong | DataType::Slong | DataType::Float32Ieee => 4,
            DataType::AUint64 | DataType::AInt64 | DataType::Float64Ieee => 8,
        }
    }

    pub fn is_float(&self) -> bool {
        matches!(
            self,
            DataType::Float16Ieee | DataType::Float32Ieee | DataType::Float64Ieee
        )
    }

    pub fn is_signed(&self) -> bool {
        matches!(
            self,
            DataType::Sbyte | DataType::Sword | DataType::Slong | DataType::AInt64
        )
    }

    /// the data types of RESERVED items and of MOD_COMMON DATA_SIZE are given as BYTE / WORD / LONG
    pub(crate) fn from_data_size(text: &str) -> Option<Self> {
        match text {
            "BYTE" => Some(DataType::Ubyte),
            "WORD" => Some(DataType::Uword),
            "LONG" => Some(DataType::Ulong),
            _ => None,
        }
    }
}

a2l_enum!(
    /// MSB_FIRST and BIG_ENDIAN are synonyms, as are MSB_LAST and LITTLE_ENDIAN
    ByteOrder {
        MsbFirst => "MSB_FIRST",
        MsbLast => "MSB_LAST",
        BigEndian => "BIG_ENDIAN",
        LittleEndian => "LITTLE_ENDIAN",
        MsbFirstMswLast => "MSB_FIRST_MSW_LAST",
        MsbLastMswFirst => "MSB_LAST_MSW_FIRST",
    }
);

impl ByteOrder {
    pub fn is_big_endian(&self) -> bool {
        matches!(
            self,
            ByteOrder::MsbFirst | ByteOrder::BigEndian | ByteOrder::MsbFirstMswLast
        )
    }
}

a2l_enum!(
    CharacteristicType {
        Value => "VALUE",
        Ascii => "ASCII",
        ValBlk => "VAL_BLK",
        Curve => "CURVE",
        Map => "MAP",
        Cuboid => "CUBOID",
        Cube4 => "CUBE_4",
        Cube5 => "CUBE_5",
    }
);

impl CharacteristicType {
    /// position of the type in the list of characteristic types, used for type masks
    pub fn ordinal(&self) -> u32 {
        match self {
            CharacteristicType::Value => 0,
            CharacteristicType::Ascii => 1,
            CharacteristicType::ValBlk => 2,
            CharacteristicType::Curve => 3,
            CharacteristicType::Map => 4,
            CharacteristicType::Cuboid => 5,
            CharacteristicType::Cube4 => 6,
            CharacteristicType::Cube5 => 7,
        }
    }
}

a2l_enum!(
    ConversionType {
        Identical => "IDENTICAL",
        Linear => "LINEAR",
        RatFunc => "RAT_FUNC",
        Form => "FORM",
        TabIntp => "TAB_INTP",
        TabNointp => "TAB_NOINTP",
        TabVerb => "TAB_VERB",
    }
);

a2l_enum!(
    IndexMode {
        ColumnDir => "COLUMN_DIR",
        RowDir => "ROW_DIR",
        AlternateCurves => "ALTERNATE_CURVES",
        AlternateWithX => "ALTERNATE_WITH_X",
        AlternateWithY => "ALTERNATE_WITH_Y",
    }
);

a2l_enum!(
    AddrType {
        Pbyte => "PBYTE",
        Pword => "PWORD",
        Plong => "PLONG",
        Plonglong => "PLONGLONG",
        Direct => "DIRECT",
    }
);

a2l_enum!(
    IndexOrder {
        IndexIncr => "INDEX_INCR",
        IndexDecr => "INDEX_DECR",
    }
);

a2l_enum!(
    Deposit {
        Absolute => "ABSOLUTE",
        Difference => "DIFFERENCE",
    }
);

a2l_enum!(
    Monotony {
        MonIncrease => "MON_INCREASE",
        MonDecrease => "MON_DECREASE",
        StrictIncrease => "STRICT_INCREASE",
        StrictDecrease => "STRICT_DECREASE",
        Monotonous => "MONOTONOUS",
        StrictMon => "STRICT_MON",
        NotMon => "NOT_MON",
    }
);

a2l_enum!(
    CalibrationAccess {
        Calibration => "CALIBRATION",
        NoCalibration => "NO_CALIBRATION",
        NotInMcdSystem => "NOT_IN_MCD_SYSTEM",
        OfflineCalibration => "OFFLINE_CALIBRATION",
    }
);

a2l_enum!(
    AxisAttribute {
        StdAxis => "STD_AXIS",
        FixAxis => "FIX_AXIS",
        ComAxis => "COM_AXIS",
        ResAxis => "RES_AXIS",
        CurveAxis => "CURVE_AXIS",
    }
);
