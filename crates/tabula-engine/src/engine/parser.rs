//! Recursive-descent parser with precedence climbing.
//!
//! Precedence, low to high: comparison, `&`, `+ -`, `* /`, `^`. Every binary
//! operator is left-associative (so `2^3^2` is `(2^3)^2`). Unary `+`/`-`
//! bind tighter than any binary operator (`-2^2` is `4`).

use super::ast::{BinaryOp, Expr, UnaryOp};
use super::cell_ref::{CellAddress, CellRange};
use super::error::FormulaError;
use super::token::{Operator, Token, TokenKind, tokenize};

/// Parse formula text (with or without a leading `=`) into an AST.
pub fn parse_formula(source: &str) -> Result<Expr, FormulaError> {
    let body = source.strip_prefix('=').unwrap_or(source);
    let tokens = tokenize(body)?;
    Parser::new(tokens).parse()
}

/// Parse and re-serialize a formula into canonical text (without `=`).
pub fn normalize_formula(source: &str) -> Result<String, FormulaError> {
    Ok(parse_formula(source)?.to_string())
}

pub struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    /// `tokens` must end with an `Eof` token, as produced by [`tokenize`].
    pub fn new(tokens: Vec<Token>) -> Self {
        Parser { tokens, pos: 0 }
    }

    pub fn parse(&mut self) -> Result<Expr, FormulaError> {
        let expr = self.parse_expr(0)?;
        let token = self.peek();
        match token.kind {
            TokenKind::Eof => Ok(expr),
            _ => Err(FormulaError::TrailingInput {
                found: token.to_string(),
                offset: token.offset,
            }),
        }
    }

    fn peek(&self) -> &Token {
        // The stream always ends with Eof and the cursor never moves past it.
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    fn advance(&mut self) -> Token {
        let token = self.peek().clone();
        if token.kind != TokenKind::Eof {
            self.pos += 1;
        }
        token
    }

    fn unexpected(&self) -> FormulaError {
        let token = self.peek();
        match token.kind {
            TokenKind::Eof => FormulaError::UnexpectedEnd {
                offset: token.offset,
            },
            _ => FormulaError::UnexpectedToken {
                found: token.to_string(),
                offset: token.offset,
            },
        }
    }

    fn peek_binary_op(&self) -> Option<BinaryOp> {
        match self.peek().kind {
            TokenKind::Operator(op) => Some(BinaryOp::from_operator(op)),
            _ => None,
        }
    }

    fn parse_expr(&mut self, min_prec: u8) -> Result<Expr, FormulaError> {
        let mut lhs = self.parse_unary()?;
        while let Some(op) = self.peek_binary_op() {
            let prec = op.precedence();
            if prec < min_prec {
                break;
            }
            self.advance();
            let rhs = self.parse_expr(prec + 1)?;
            lhs = Expr::binary(op, lhs, rhs);
        }
        Ok(lhs)
    }

    fn parse_unary(&mut self) -> Result<Expr, FormulaError> {
        let op = match self.peek().kind {
            TokenKind::Operator(Operator::Minus) => UnaryOp::Minus,
            TokenKind::Operator(Operator::Plus) => UnaryOp::Plus,
            _ => return self.parse_primary(),
        };
        self.advance();
        let operand = self.parse_unary()?;
        Ok(Expr::unary(op, operand))
    }

    fn parse_primary(&mut self) -> Result<Expr, FormulaError> {
        let token = self.peek().clone();
        match token.kind {
            TokenKind::Number(n) => {
                self.advance();
                Ok(Expr::Number(n))
            }
            TokenKind::Str(s) => {
                self.advance();
                Ok(Expr::Text(s))
            }
            TokenKind::Bool(b) => {
                self.advance();
                Ok(Expr::Bool(b))
            }
            TokenKind::Cell => {
                self.advance();
                // Cell-shaped but out of bounds (e.g. `ABCD1`, `A0`) is left for
                // the evaluator to report.
                Ok(match CellAddress::parse(&token.text) {
                    Ok(addr) => Expr::Cell(addr),
                    Err(_) => Expr::Name(token.text),
                })
            }
            TokenKind::Range => {
                self.advance();
                Ok(match CellRange::parse(&token.text) {
                    Ok(range) => Expr::Range(range),
                    Err(_) => Expr::Name(token.text),
                })
            }
            TokenKind::Ident => {
                self.advance();
                Ok(Expr::Name(token.text))
            }
            TokenKind::Function => {
                self.advance();
                self.parse_call(token.text.to_ascii_uppercase())
            }
            TokenKind::LParen => {
                self.advance();
                let inner = self.parse_expr(0)?;
                self.expect_close(token.offset)?;
                Ok(inner)
            }
            _ => Err(self.unexpected()),
        }
    }

    fn parse_call(&mut self, name: String) -> Result<Expr, FormulaError> {
        let open = self.advance();
        debug_assert_eq!(open.kind, TokenKind::LParen);

        let mut args = Vec::new();
        if self.peek().kind == TokenKind::RParen {
            self.advance();
            return Ok(Expr::Call { name, args });
        }
        loop {
            args.push(self.parse_expr(0)?);
            match self.peek().kind {
                TokenKind::Comma => {
                    self.advance();
                }
                _ => {
                    self.expect_close(open.offset)?;
                    return Ok(Expr::Call { name, args });
                }
            }
        }
    }

    fn expect_close(&mut self, open_offset: usize) -> Result<(), FormulaError> {
        match self.peek().kind {
            TokenKind::RParen => {
                self.advance();
                Ok(())
            }
            TokenKind::Eof => Err(FormulaError::UnmatchedParen {
                offset: open_offset,
            }),
            _ => Err(self.unexpected()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::cell_ref::CellRef;
    use proptest::prelude::*;

    fn num(n: f64) -> Expr {
        Expr::Number(n)
    }

    #[test]
    fn test_parse_precedence() {
        let expr = parse_formula("1+2*3").unwrap();
        assert_eq!(
            expr,
            Expr::binary(
                BinaryOp::Add,
                num(1.0),
                Expr::binary(BinaryOp::Mul, num(2.0), num(3.0))
            )
        );
    }

    #[test]
    fn test_parse_exponent_is_left_associative() {
        let expr = parse_formula("2^3^2").unwrap();
        assert_eq!(
            expr,
            Expr::binary(
                BinaryOp::Pow,
                Expr::binary(BinaryOp::Pow, num(2.0), num(3.0)),
                num(2.0)
            )
        );
    }

    #[test]
    fn test_parse_unary_binds_tighter_than_power() {
        let expr = parse_formula("-2^2").unwrap();
        assert_eq!(
            expr,
            Expr::binary(BinaryOp::Pow, Expr::unary(UnaryOp::Minus, num(2.0)), num(2.0))
        );
    }

    #[test]
    fn test_parse_comparison_lowest() {
        let expr = parse_formula("=A1&\"x\"=\"1x\"").unwrap();
        match expr {
            Expr::Binary { op, lhs, .. } => {
                assert_eq!(op, BinaryOp::Eq);
                assert!(matches!(*lhs, Expr::Binary { op: BinaryOp::Concat, .. }));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_parse_function_calls() {
        let expr = parse_formula("sum(A1:B2, 3, now())").unwrap();
        match expr {
            Expr::Call { name, args } => {
                assert_eq!(name, "SUM");
                assert_eq!(args.len(), 3);
                assert!(matches!(&args[0], Expr::Range(r) if r.end.cell_ref() == CellRef::new(1, 1)));
                assert_eq!(
                    args[2],
                    Expr::Call {
                        name: "NOW".to_string(),
                        args: vec![]
                    }
                );
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_parse_bare_names_are_deferred() {
        assert_eq!(parse_formula("rate").unwrap(), Expr::Name("rate".to_string()));
        assert_eq!(parse_formula("ABCD1").unwrap(), Expr::Name("ABCD1".to_string()));
    }

    #[test]
    fn test_parse_errors_carry_offsets() {
        assert_eq!(
            parse_formula("(1+2"),
            Err(FormulaError::UnmatchedParen { offset: 0 })
        );
        assert_eq!(
            parse_formula("SUM(1,"),
            Err(FormulaError::UnexpectedEnd { offset: 6 })
        );
        assert_eq!(
            parse_formula("1+2)"),
            Err(FormulaError::TrailingInput {
                found: "')'".to_string(),
                offset: 3
            })
        );
        assert_eq!(
            parse_formula("1 2"),
            Err(FormulaError::TrailingInput {
                found: "'2'".to_string(),
                offset: 2
            })
        );
        assert_eq!(
            parse_formula("*3"),
            Err(FormulaError::UnexpectedToken {
                found: "'*'".to_string(),
                offset: 0
            })
        );
        assert!(parse_formula("").is_err());
    }

    #[test]
    fn test_normalize_formula() {
        assert_eq!(normalize_formula("=sum( a1 : b2 )").ok(), None);
        assert_eq!(normalize_formula("=sum( a1:b2 )").unwrap(), "SUM(A1:B2)");
        assert_eq!(normalize_formula("(1+2)*3").unwrap(), "(1+2)*3");
        assert_eq!(normalize_formula("1+(2*3)").unwrap(), "1+2*3");
        assert_eq!(normalize_formula("1-(2-3)").unwrap(), "1-(2-3)");
        assert_eq!(normalize_formula("if(a1>=10,\"a\"\"b\",-(1+2))").unwrap(), "IF(A1 >= 10, \"a\"\"b\", -(1+2))");
        assert_eq!(normalize_formula("'My Sheet'!$a$1").unwrap(), "'My Sheet'!$A$1");
    }

    fn arb_expr() -> impl Strategy<Value = Expr> {
        let leaf = prop_oneof![
            (0u32..1000).prop_map(|n| Expr::Number(n as f64)),
            "[a-z ]{0,4}".prop_map(Expr::Text),
            any::<bool>().prop_map(Expr::Bool),
            (0usize..30, 0usize..30).prop_map(|(c, r)| Expr::Cell(CellAddress::new(c, r))),
        ];
        leaf.prop_recursive(4, 32, 3, |inner| {
            prop_oneof![
                (inner.clone(), inner.clone(), 0usize..12).prop_map(|(l, r, i)| {
                    let ops = [
                        BinaryOp::Add,
                        BinaryOp::Sub,
                        BinaryOp::Mul,
                        BinaryOp::Div,
                        BinaryOp::Pow,
                        BinaryOp::Concat,
                        BinaryOp::Eq,
                        BinaryOp::Ne,
                        BinaryOp::Lt,
                        BinaryOp::Gt,
                        BinaryOp::Le,
                        BinaryOp::Ge,
                    ];
                    Expr::binary(ops[i], l, r)
                }),
                inner.clone().prop_map(|e| Expr::unary(UnaryOp::Minus, e)),
                proptest::collection::vec(inner, 0..3)
                    .prop_map(|args| Expr::Call { name: "SUM".to_string(), args }),
            ]
        })
    }

    proptest! {
        #[test]
        fn prop_serialized_ast_reparses_to_same_tree(expr in arb_expr()) {
            let text = expr.to_string();
            let reparsed = parse_formula(&text).unwrap();
            prop_assert_eq!(reparsed, expr);
        }
    }
}
