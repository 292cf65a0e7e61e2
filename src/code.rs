use crate::ErrorKind;
use std::fmt;

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Opcode {
    Constant,
    Pop,
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    True,
    False,
    Null,
    Equal,
    NotEqual,
    GreaterThan,
    GreaterThanEqual,
    And,
    Or,
    Minus,
    Bang,
    JumpNotTruthy,
    Jump,
    GetGlobal,
    SetGlobal,
    GetLocal,
    SetLocal,
    GetBuiltin,
    GetFree,
    CurrentClosure,
    List,
    Index,
    Call,
    ReturnValue,
    Return,
    Closure,
}

const OPCODES: [Opcode; 33] = [
    Opcode::Constant,
    Opcode::Pop,
    Opcode::Add,
    Opcode::Sub,
    Opcode::Mul,
    Opcode::Div,
    Opcode::Mod,
    Opcode::True,
    Opcode::False,
    Opcode::Null,
    Opcode::Equal,
    Opcode::NotEqual,
    Opcode::GreaterThan,
    Opcode::GreaterThanEqual,
    Opcode::And,
    Opcode::Or,
    Opcode::Minus,
    Opcode::Bang,
    Opcode::JumpNotTruthy,
    Opcode::Jump,
    Opcode::GetGlobal,
    Opcode::SetGlobal,
    Opcode::GetLocal,
    Opcode::SetLocal,
    Opcode::GetBuiltin,
    Opcode::GetFree,
    Opcode::CurrentClosure,
    Opcode::List,
    Opcode::Index,
    Opcode::Call,
    Opcode::ReturnValue,
    Opcode::Return,
    Opcode::Closure,
];

impl Opcode {
    /// Width in bytes of each operand, in encoding order.
    pub fn operand_widths(self) -> &'static [usize] {
        match self {
            Opcode::Constant
            | Opcode::JumpNotTruthy
            | Opcode::Jump
            | Opcode::GetGlobal
            | Opcode::SetGlobal
            | Opcode::List => &[2],
            Opcode::GetLocal
            | Opcode::SetLocal
            | Opcode::GetBuiltin
            | Opcode::GetFree
            | Opcode::Call => &[1],
            Opcode::Closure => &[2, 1],
            _ => &[],
        }
    }

    /// Total encoded size, opcode byte included.
    pub fn width(self) -> usize {
        1 + self.operand_widths().iter().sum::<usize>()
    }
}

impl TryFrom<u8> for Opcode {
    type Error = ErrorKind;

    fn try_from(byte: u8) -> Result<Self, Self::Error> {
        OPCODES
            .get(byte as usize)
            .copied()
            .ok_or_else(|| ErrorKind::Internal(format!("unknown opcode {}", byte)))
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Op{:?}", self)
    }
}

/// Encodes one instruction, operands big-endian.
pub fn make(opcode: Opcode, operands: &[usize]) -> Result<Vec<u8>, ErrorKind> {
    let widths = opcode.operand_widths();
    if widths.len() != operands.len() {
        return Err(ErrorKind::Internal(format!(
            "{} expects {} operands, got {}",
            opcode,
            widths.len(),
            operands.len()
        )));
    }

    let mut instruction = Vec::with_capacity(opcode.width());
    instruction.push(opcode as u8);
    for (operand, width) in operands.iter().zip(widths) {
        let too_large = || ErrorKind::OperandTooLarge {
            opcode: opcode.to_string(),
            operand: *operand,
            width: *width,
        };
        match width {
            2 => {
                let operand = u16::try_from(*operand).map_err(|_| too_large())?;
                instruction.extend_from_slice(&operand.to_be_bytes());
            }
            _ => instruction.push(u8::try_from(*operand).map_err(|_| too_large())?),
        }
    }
    Ok(instruction)
}

pub fn read_u16(bytes: &[u8]) -> Option<u16> {
    let bytes: [u8; 2] = bytes.get(..2)?.try_into().ok()?;
    Some(u16::from_be_bytes(bytes))
}

pub fn read_u8(bytes: &[u8]) -> Option<u8> {
    bytes.first().copied()
}

/// Decodes the operands that follow an opcode. Returns them with the number
/// of bytes they occupied, or `None` if the stream is truncated.
pub fn read_operands(opcode: Opcode, bytes: &[u8]) -> Option<(Vec<usize>, usize)> {
    let mut operands = Vec::with_capacity(opcode.operand_widths().len());
    let mut offset = 0;
    for width in opcode.operand_widths() {
        let rest = bytes.get(offset..)?;
        let operand = match width {
            2 => read_u16(rest)? as usize,
            _ => read_u8(rest)? as usize,
        };
        operands.push(operand);
        offset += width;
    }
    Some((operands, offset))
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Instructions(pub Vec<u8>);

impl Instructions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn disassemble(&self) -> String {
        let mut lines = Vec::new();
        let mut offset = 0;
        while offset < self.0.len() {
            let opcode = match Opcode::try_from(self.0[offset]) {
                Ok(opcode) => opcode,
                Err(error) => {
                    lines.push(format!("{:0>4} ERROR: {}", offset, error));
                    offset += 1;
                    continue;
                }
            };
            match read_operands(opcode, &self.0[offset + 1..]) {
                Some((operands, read)) => {
                    let operands = operands
                        .iter()
                        .map(|x| x.to_string())
                        .collect::<Vec<String>>()
                        .join(" ");
                    lines.push(format!("{:0>4} {} {}", offset, opcode, operands).trim_end().to_string());
                    offset += 1 + read;
                }
                None => {
                    lines.push(format!("{:0>4} ERROR: truncated {}", offset, opcode));
                    break;
                }
            }
        }
        lines.join("\n")
    }
}

impl From<Vec<u8>> for Instructions {
    fn from(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }
}

impl FromIterator<Vec<u8>> for Instructions {
    fn from_iter<T: IntoIterator<Item = Vec<u8>>>(iter: T) -> Self {
        Self(iter.into_iter().flatten().collect())
    }
}

impl fmt::Display for Instructions {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.disassemble())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;

    #[test]
    fn test_opcode_round_trips_through_byte() -> Result<()> {
        for opcode in OPCODES {
            assert_eq!(Opcode::try_from(opcode as u8)?, opcode);
        }
        assert!(Opcode::try_from(OPCODES.len() as u8).is_err());
        Ok(())
    }

    #[test]
    fn test_make() -> Result<()> {
        let tests = [
            (
                Opcode::Constant,
                vec![65534],
                vec![Opcode::Constant as u8, 255, 254],
            ),
            (Opcode::Add, vec![], vec![Opcode::Add as u8]),
            (Opcode::GetLocal, vec![255], vec![Opcode::GetLocal as u8, 255]),
            (
                Opcode::Closure,
                vec![65534, 255],
                vec![Opcode::Closure as u8, 255, 254, 255],
            ),
        ];

        for (opcode, operands, expected) in tests {
            assert_eq!(make(opcode, &operands)?, expected);
        }
        Ok(())
    }

    #[test]
    fn test_make_rejects_oversized_operands() {
        let tests = [
            (Opcode::Constant, vec![65536]),
            (Opcode::GetLocal, vec![256]),
            (Opcode::Closure, vec![1, 300]),
        ];

        for (opcode, operands) in tests {
            assert!(matches!(
                make(opcode, &operands),
                Err(ErrorKind::OperandTooLarge { .. })
            ));
        }
    }

    #[test]
    fn test_read_operands() -> Result<()> {
        let tests = [
            (Opcode::Constant, vec![65535], 2),
            (Opcode::GetLocal, vec![255], 1),
            (Opcode::Closure, vec![65535, 255], 3),
        ];

        for (opcode, operands, bytes_read) in tests {
            let instruction = make(opcode, &operands)?;
            let (read, offset) = read_operands(opcode, &instruction[1..]).unwrap();
            assert_eq!(offset, bytes_read);
            assert_eq!(read, operands);
        }
        Ok(())
    }

    #[test]
    fn test_instruction_strings() -> Result<()> {
        let instructions = [
            make(Opcode::Add, &[])?,
            make(Opcode::GetLocal, &[1])?,
            make(Opcode::Constant, &[2])?,
            make(Opcode::Constant, &[65535])?,
            make(Opcode::Closure, &[65535, 255])?,
        ]
        .into_iter()
        .collect::<Instructions>();

        let expected = [
            "0000 OpAdd",
            "0001 OpGetLocal 1",
            "0003 OpConstant 2",
            "0006 OpConstant 65535",
            "0009 OpClosure 65535 255",
        ]
        .join("\n");

        assert_eq!(instructions.disassemble(), expected);
        Ok(())
    }
}
