use crate::op::criteria;
use num_enum::{FromPrimitive, IntoPrimitive};
use strum::{Display, EnumString};

#[derive(
    Debug, Clone, Copy, PartialEq, Default, FromPrimitive, IntoPrimitive, EnumString, Display, Eq,
)]
#[repr(u8)]
pub enum Reg {
    #[default]
    R0,
    R1,
    R2,
    R3,
    R4,
    R5,
    #[strum(to_string = "R6", serialize = "SP")]
    R6,
    #[strum(to_string = "R7", serialize = "PC")]
    R7,
}

impl Reg {
    pub fn parse(s: &str) -> Result<Self, String> {
        match s.to_ascii_uppercase().parse::<Self>() {
            Ok(a) => Ok(a),
            Err(_) => Err(format!("Unknown reg name: {s}")),
        }
    }

    /// Hardware capability class of the register, as criteria bits.
    ///
    /// R0-R3 can be shifted, R1-R6 can be used as indirect pointers and
    /// R4-R6 can receive a JSR return address. R7 has no special class.
    pub fn criteria(self) -> u16 {
        use Reg::*;
        match self {
            R0 => criteria::SHF_RG,
            R1 | R2 | R3 => criteria::SHF_RG | criteria::IND_RG,
            R4 | R5 | R6 => criteria::JSR_RG | criteria::IND_RG,
            R7 => 0,
        }
    }

    pub fn num(self) -> i32 {
        u8::from(self) as i32
    }
}

#[test]
fn test() {
    println!("{}", Reg::R6);
    assert_eq!(Reg::parse("sp"), Ok(Reg::R6));
    assert_eq!(Reg::parse("r3"), Ok(Reg::R3));
    assert_eq!(Reg::parse("Pc"), Ok(Reg::R7));
    assert!(Reg::parse("r8").is_err());
    assert_eq!(Reg::from(5u8), Reg::R5);
    assert_eq!(Reg::R0.criteria(), criteria::SHF_RG);
    assert_eq!(Reg::R7.criteria(), 0);
}
