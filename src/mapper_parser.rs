//! Text form of element mappers and force feedback actuators.
//!
//! ```text
//! Null
//! Axis(X)            Axis(RotY, +)       DigitalAxis(Y, Negative)
//! Button(3)          Pov(Up)             Keyboard(0x20)
//! Split(Button(1), Keyboard(0x1B))
//! SingleAxis(Z, -)   MagnitudeProjection(X, Y)
//! ```
//!
//! Keywords and names are case-insensitive. Button numbers are 1-based.

use crate::element::{Axis, AxisDirection, Button, PovDirection, BUTTON_COUNT};
use crate::element_mapper::ElementMapper;
use crate::error::ParseError;
use crate::mapper::ForceFeedbackActuator;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Term {
    Atom(String),
    Call { name: String, args: Vec<Term> },
}

impl Term {
    fn name(&self) -> &str {
        match self {
            Term::Atom(text) => text,
            Term::Call { name, .. } => name,
        }
    }
}

struct Parser<'a> {
    input: &'a str,
    pos: usize,
}

impl<'a> Parser<'a> {
    fn new(input: &'a str) -> Self {
        Self { input, pos: 0 }
    }

    fn peek(&self) -> Option<char> {
        self.input[self.pos..].chars().next()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += c.len_utf8();
        Some(c)
    }

    fn skip_whitespace(&mut self) {
        while self.peek().is_some_and(char::is_whitespace) {
            self.bump();
        }
    }

    fn syntax(&self, message: impl Into<String>) -> ParseError {
        ParseError::Syntax {
            position: self.pos,
            message: message.into(),
        }
    }

    fn parse_document(mut self) -> Result<Term, ParseError> {
        let term = self.parse_term()?;
        self.skip_whitespace();
        if self.peek().is_some() {
            return Err(self.syntax("unexpected trailing input"));
        }
        Ok(term)
    }

    fn parse_term(&mut self) -> Result<Term, ParseError> {
        self.skip_whitespace();
        let start = self.pos;
        while self
            .peek()
            .is_some_and(|c| !matches!(c, '(' | ')' | ',') && !c.is_whitespace())
        {
            self.bump();
        }
        let word = self.input[start..self.pos].to_string();
        if word.is_empty() {
            return Err(self.syntax("expected a value"));
        }

        self.skip_whitespace();
        if self.peek() != Some('(') {
            return Ok(Term::Atom(word));
        }
        self.bump();

        let mut args = Vec::new();
        self.skip_whitespace();
        if self.peek() == Some(')') {
            self.bump();
        } else {
            loop {
                args.push(self.parse_term()?);
                self.skip_whitespace();
                match self.bump() {
                    Some(',') => continue,
                    Some(')') => break,
                    _ => return Err(self.syntax("expected ',' or ')'")),
                }
            }
        }

        Ok(Term::Call { name: word, args })
    }
}

fn is_null(text: &str) -> bool {
    text.eq_ignore_ascii_case("Null") || text.eq_ignore_ascii_case("None")
}

fn invalid(mapper: &str, param: &Term) -> ParseError {
    ParseError::InvalidParameter {
        mapper: mapper.to_string(),
        param: param.name().to_string(),
    }
}

fn expect_args<'t>(
    mapper: &str,
    args: &'t [Term],
    min: usize,
    max: usize,
    expected: &'static str,
) -> Result<&'t [Term], ParseError> {
    if args.len() < min || args.len() > max {
        return Err(ParseError::ParameterCount {
            mapper: mapper.to_string(),
            expected,
            got: args.len(),
        });
    }
    Ok(args)
}

fn atom<'t>(mapper: &str, term: &'t Term) -> Result<&'t str, ParseError> {
    match term {
        Term::Atom(text) => Ok(text),
        Term::Call { .. } => Err(invalid(mapper, term)),
    }
}

fn parse_axis(mapper: &str, term: &Term) -> Result<Axis, ParseError> {
    Axis::from_name(atom(mapper, term)?).ok_or_else(|| invalid(mapper, term))
}

fn parse_direction(mapper: &str, term: Option<&Term>) -> Result<AxisDirection, ParseError> {
    let Some(term) = term else {
        return Ok(AxisDirection::Both);
    };
    match atom(mapper, term)?.to_ascii_lowercase().as_str() {
        "both" | "+/-" => Ok(AxisDirection::Both),
        "+" | "positive" | "pos" => Ok(AxisDirection::Positive),
        "-" | "negative" | "neg" => Ok(AxisDirection::Negative),
        _ => Err(invalid(mapper, term)),
    }
}

fn parse_number(text: &str) -> Option<u32> {
    if let Some(hex) = text
        .strip_prefix("0x")
        .or_else(|| text.strip_prefix("0X"))
    {
        u32::from_str_radix(hex, 16).ok()
    } else {
        text.parse().ok()
    }
}

fn element_mapper_from_term(term: &Term) -> Result<Option<ElementMapper>, ParseError> {
    let (name, args) = match term {
        Term::Atom(text) if is_null(text) => return Ok(None),
        Term::Atom(text) => return Err(ParseError::UnknownMapperType(text.clone())),
        Term::Call { name, args } => (name.as_str(), args.as_slice()),
    };

    let mapper = match name.to_ascii_lowercase().as_str() {
        "null" | "none" => {
            expect_args(name, args, 0, 0, "0")?;
            return Ok(None);
        }
        "axis" | "digitalaxis" => {
            let args = expect_args(name, args, 1, 2, "1 or 2")?;
            let axis = parse_axis(name, &args[0])?;
            let direction = parse_direction(name, args.get(1))?;
            if name.eq_ignore_ascii_case("axis") {
                ElementMapper::axis(axis, direction)
            } else {
                ElementMapper::digital_axis(axis, direction)
            }
        }
        "button" => {
            let args = expect_args(name, args, 1, 1, "1")?;
            let number = parse_number(atom(name, &args[0])?)
                .filter(|n| (1..=BUTTON_COUNT as u32).contains(n))
                .ok_or_else(|| invalid(name, &args[0]))?;
            let button = Button::new(number as usize - 1).ok_or_else(|| invalid(name, &args[0]))?;
            ElementMapper::button(button)
        }
        "pov" => {
            let args = expect_args(name, args, 1, 1, "1")?;
            let direction = PovDirection::from_name(atom(name, &args[0])?)
                .ok_or_else(|| invalid(name, &args[0]))?;
            ElementMapper::pov(direction)
        }
        "keyboard" => {
            let args = expect_args(name, args, 1, 1, "1")?;
            let key = parse_number(atom(name, &args[0])?)
                .and_then(|k| u16::try_from(k).ok())
                .filter(|k| *k != 0)
                .ok_or_else(|| invalid(name, &args[0]))?;
            ElementMapper::keyboard(key)
        }
        "split" => {
            let args = expect_args(name, args, 2, 2, "2")?;
            let positive = element_mapper_from_term(&args[0])?;
            let negative = element_mapper_from_term(&args[1])?;
            ElementMapper::split(positive, negative)
        }
        _ => return Err(ParseError::UnknownMapperType(name.to_string())),
    };
    Ok(Some(mapper))
}

/// Parses one element mapper. `Null` parses to `None` (slot removed).
pub fn parse_element_mapper(text: &str) -> Result<Option<ElementMapper>, ParseError> {
    let term = Parser::new(text).parse_document()?;
    element_mapper_from_term(&term)
}

/// Parses one force feedback actuator. `Null` parses to `None` (motor off).
pub fn parse_actuator(text: &str) -> Result<Option<ForceFeedbackActuator>, ParseError> {
    let term = Parser::new(text).parse_document()?;
    let (name, args) = match &term {
        Term::Atom(text) if is_null(text) => return Ok(None),
        Term::Atom(text) => return Err(ParseError::UnknownMapperType(text.clone())),
        Term::Call { name, args } => (name.as_str(), args.as_slice()),
    };

    match name.to_ascii_lowercase().as_str() {
        "singleaxis" => {
            let args = expect_args(name, args, 1, 2, "1 or 2")?;
            let axis = parse_axis(name, &args[0])?;
            let direction = parse_direction(name, args.get(1))?;
            Ok(Some(ForceFeedbackActuator::SingleAxis(axis, direction)))
        }
        "magnitudeprojection" => {
            let args = expect_args(name, args, 2, 2, "2")?;
            let first = parse_axis(name, &args[0])?;
            let second = parse_axis(name, &args[1])?;
            if first == second {
                return Err(invalid(name, &args[1]));
            }
            Ok(Some(ForceFeedbackActuator::MagnitudeProjection(first, second)))
        }
        _ => Err(ParseError::UnknownMapperType(name.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(text: &str) -> ElementMapper {
        parse_element_mapper(text).unwrap().unwrap()
    }

    #[test]
    fn parses_leaf_mappers() {
        assert_eq!(parse("Axis(X)"), ElementMapper::axis(Axis::X, AxisDirection::Both));
        assert_eq!(
            parse(" axis ( rotz , + ) "),
            ElementMapper::axis(Axis::RotZ, AxisDirection::Positive)
        );
        assert_eq!(
            parse("DigitalAxis(Y, Negative)"),
            ElementMapper::digital_axis(Axis::Y, AxisDirection::Negative)
        );
        assert_eq!(parse("Button(16)"), ElementMapper::button(Button::new(15).unwrap()));
        assert_eq!(parse("Pov(left)"), ElementMapper::pov(PovDirection::Left));
        assert_eq!(parse("Keyboard(0x1B)"), ElementMapper::keyboard(0x1B));
        assert_eq!(parse("Keyboard(65)"), ElementMapper::keyboard(65));
    }

    #[test]
    fn parses_nested_split_with_null_branch() {
        assert_eq!(
            parse("Split(Split(Button(1), Null), Keyboard(0x20))"),
            ElementMapper::split(
                Some(ElementMapper::split(
                    Some(ElementMapper::button(Button::new(0).unwrap())),
                    None
                )),
                Some(ElementMapper::keyboard(0x20)),
            )
        );
    }

    #[test]
    fn null_means_removed() {
        assert_eq!(parse_element_mapper("Null").unwrap(), None);
        assert_eq!(parse_element_mapper("null()").unwrap(), None);
    }

    #[test]
    fn display_output_parses_back() {
        let text = "Split(DigitalAxis(Z, -), Pov(Down))";
        assert_eq!(parse(text).to_string(), text);
    }

    #[test]
    fn rejects_bad_input() {
        assert!(matches!(
            parse_element_mapper("Button(0)"),
            Err(ParseError::InvalidParameter { .. })
        ));
        assert!(matches!(
            parse_element_mapper("Button(17)"),
            Err(ParseError::InvalidParameter { .. })
        ));
        assert!(matches!(
            parse_element_mapper("Axis(W)"),
            Err(ParseError::InvalidParameter { .. })
        ));
        assert!(matches!(
            parse_element_mapper("Axis()"),
            Err(ParseError::ParameterCount { got: 0, .. })
        ));
        assert!(matches!(
            parse_element_mapper("Split(Button(1))"),
            Err(ParseError::ParameterCount { got: 1, .. })
        ));
        assert!(matches!(
            parse_element_mapper("Turbo(1)"),
            Err(ParseError::UnknownMapperType(_))
        ));
        assert!(matches!(
            parse_element_mapper("Button(1"),
            Err(ParseError::Syntax { .. })
        ));
        assert!(matches!(
            parse_element_mapper("Button(1) extra"),
            Err(ParseError::Syntax { .. })
        ));
        assert!(matches!(parse_element_mapper(""), Err(ParseError::Syntax { .. })));
    }

    #[test]
    fn parses_actuators() {
        assert_eq!(
            parse_actuator("SingleAxis(Z, -)").unwrap(),
            Some(ForceFeedbackActuator::SingleAxis(Axis::Z, AxisDirection::Negative))
        );
        assert_eq!(
            parse_actuator("MagnitudeProjection(RotX, RotY)").unwrap(),
            Some(ForceFeedbackActuator::MagnitudeProjection(Axis::RotX, Axis::RotY))
        );
        assert_eq!(parse_actuator("Null").unwrap(), None);
        assert!(parse_actuator("MagnitudeProjection(X, X)").is_err());
        assert!(parse_actuator("Button(1)").is_err());
    }
}
