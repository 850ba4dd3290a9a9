//! Calculate 工具：精确四则运算与常用数学函数
//!
//! 递归下降求值，不执行任意代码。支持 + - * / % ^ **、括号、一元负号，
//! 函数 sqrt abs sin cos tan log exp floor ceil round min max pow，常量 pi / e。

use async_trait::async_trait;
use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::{json, Map, Value};

use crate::tools::schema::{parse_args, schema_of};
use crate::tools::{Tool, ToolOutcome};

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Num(f64),
    Ident(String),
    Op(char),
    Pow,
    LParen,
    RParen,
    Comma,
}

fn tokenize(input: &str) -> Result<Vec<Token>, String> {
    let chars: Vec<char> = input.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        match c {
            c if c.is_whitespace() => i += 1,
            '0'..='9' | '.' => {
                let start = i;
                while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                    i += 1;
                }
                let literal: String = chars[start..i].iter().collect();
                let n = literal
                    .parse::<f64>()
                    .map_err(|_| format!("número inválido '{literal}'"))?;
                tokens.push(Token::Num(n));
            }
            c if c.is_alphabetic() || c == '_' => {
                let start = i;
                while i < chars.len() && (chars[i].is_alphanumeric() || chars[i] == '_') {
                    i += 1;
                }
                tokens.push(Token::Ident(chars[start..i].iter().collect::<String>().to_lowercase()));
            }
            '*' if chars.get(i + 1) == Some(&'*') => {
                tokens.push(Token::Pow);
                i += 2;
            }
            '^' => {
                tokens.push(Token::Pow);
                i += 1;
            }
            '+' | '-' | '*' | '/' | '%' => {
                tokens.push(Token::Op(c));
                i += 1;
            }
            '(' => {
                tokens.push(Token::LParen);
                i += 1;
            }
            ')' => {
                tokens.push(Token::RParen);
                i += 1;
            }
            ',' => {
                tokens.push(Token::Comma);
                i += 1;
            }
            other => return Err(format!("caractere inesperado '{other}'")),
        }
    }
    Ok(tokens)
}

/// 嵌套上限：括号、函数调用、一元符号与乘方的递归都经过 unary
const MAX_DEPTH: usize = 64;

/// 表达式长度上限（字符）
pub const MAX_EXPRESSION_CHARS: usize = 1000;

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    depth: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token> {
        let t = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        t
    }

    fn expect(&mut self, expected: Token) -> Result<(), String> {
        match self.next() {
            Some(t) if t == expected => Ok(()),
            Some(t) => Err(format!("esperado {expected:?}, encontrado {t:?}")),
            None => Err(format!("esperado {expected:?}, fim da expressão")),
        }
    }

    fn expr(&mut self) -> Result<f64, String> {
        let mut acc = self.term()?;
        while let Some(Token::Op(op @ ('+' | '-'))) = self.peek().cloned() {
            self.pos += 1;
            let rhs = self.term()?;
            acc = if op == '+' { acc + rhs } else { acc - rhs };
        }
        Ok(acc)
    }

    fn term(&mut self) -> Result<f64, String> {
        let mut acc = self.unary()?;
        while let Some(Token::Op(op @ ('*' | '/' | '%'))) = self.peek().cloned() {
            self.pos += 1;
            let rhs = self.unary()?;
            acc = match op {
                '*' => acc * rhs,
                _ if rhs == 0.0 => return Err("divisão por zero".to_string()),
                '/' => acc / rhs,
                _ => acc % rhs,
            };
        }
        Ok(acc)
    }

    fn unary(&mut self) -> Result<f64, String> {
        if self.depth >= MAX_DEPTH {
            return Err("expressão muito aninhada".to_string());
        }
        self.depth += 1;
        let value = match self.peek() {
            Some(Token::Op('-')) => {
                self.pos += 1;
                self.unary().map(|v| -v)
            }
            Some(Token::Op('+')) => {
                self.pos += 1;
                self.unary()
            }
            _ => self.power(),
        };
        self.depth -= 1;
        value
    }

    // 右结合：2 ^ 3 ^ 2 = 2 ^ 9；-2 ^ 2 = -(2 ^ 2)
    fn power(&mut self) -> Result<f64, String> {
        let base = self.primary()?;
        if self.peek() == Some(&Token::Pow) {
            self.pos += 1;
            let exp = self.unary()?;
            return Ok(base.powf(exp));
        }
        Ok(base)
    }

    fn primary(&mut self) -> Result<f64, String> {
        match self.next() {
            Some(Token::Num(n)) => Ok(n),
            Some(Token::LParen) => {
                let v = self.expr()?;
                self.expect(Token::RParen)?;
                Ok(v)
            }
            Some(Token::Ident(name)) => {
                if self.peek() == Some(&Token::LParen) {
                    self.pos += 1;
                    let mut args = vec![self.expr()?];
                    while self.peek() == Some(&Token::Comma) {
                        self.pos += 1;
                        args.push(self.expr()?);
                    }
                    self.expect(Token::RParen)?;
                    call(&name, &args)
                } else {
                    match name.as_str() {
                        "pi" => Ok(std::f64::consts::PI),
                        "e" => Ok(std::f64::consts::E),
                        other => Err(format!("nome desconhecido '{other}'")),
                    }
                }
            }
            Some(t) => Err(format!("token inesperado {t:?}")),
            None => Err("expressão incompleta".to_string()),
        }
    }
}

fn call(name: &str, args: &[f64]) -> Result<f64, String> {
    let one = || -> Result<f64, String> {
        match args {
            [x] => Ok(*x),
            _ => Err(format!("{name}() espera 1 argumento")),
        }
    };
    let two = || -> Result<(f64, f64), String> {
        match args {
            [a, b] => Ok((*a, *b)),
            _ => Err(format!("{name}() espera 2 argumentos")),
        }
    };
    match name {
        "sqrt" => {
            let x = one()?;
            if x < 0.0 {
                return Err("raiz de número negativo".to_string());
            }
            Ok(x.sqrt())
        }
        "abs" => Ok(one()?.abs()),
        "sin" => Ok(one()?.sin()),
        "cos" => Ok(one()?.cos()),
        "tan" => Ok(one()?.tan()),
        "exp" => Ok(one()?.exp()),
        "floor" => Ok(one()?.floor()),
        "ceil" => Ok(one()?.ceil()),
        "round" => Ok(one()?.round()),
        "log" => match args {
            [x] => Ok(x.ln()),
            [x, base] => Ok(x.log(*base)),
            _ => Err("log() espera 1 ou 2 argumentos".to_string()),
        },
        "pow" => {
            let (a, b) = two()?;
            Ok(a.powf(b))
        }
        "min" if !args.is_empty() => Ok(args.iter().copied().fold(f64::INFINITY, f64::min)),
        "max" if !args.is_empty() => Ok(args.iter().copied().fold(f64::NEG_INFINITY, f64::max)),
        other => Err(format!("função desconhecida '{other}'")),
    }
}

/// 求值数学表达式
pub fn evaluate(expression: &str) -> Result<f64, String> {
    let tokens = tokenize(expression)?;
    if tokens.is_empty() {
        return Err("expressão vazia".to_string());
    }
    let mut parser = Parser {
        tokens,
        pos: 0,
        depth: 0,
    };
    let value = parser.expr()?;
    if parser.pos < parser.tokens.len() {
        return Err(format!("sobra inesperada em {:?}", parser.tokens[parser.pos]));
    }
    if !value.is_finite() {
        return Err("resultado não é um número finito".to_string());
    }
    Ok(value)
}

fn display(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{value:.0}")
    } else {
        value.to_string()
    }
}

#[derive(Deserialize, JsonSchema)]
struct CalculateArgs {
    /// Expressão matemática a calcular (ex: '2 + 2', 'sqrt(144)', '3.14 * 2**2')
    expression: String,
}

pub struct CalculatorTool;

#[async_trait]
impl Tool for CalculatorTool {
    fn name(&self) -> &str {
        "calculate"
    }

    fn description(&self) -> &str {
        "Realiza cálculos matemáticos precisos. Use para somas, subtrações, multiplicações, divisões, raízes, potências, etc."
    }

    fn parameters_schema(&self) -> Value {
        schema_of::<CalculateArgs>()
    }

    async fn execute(&self, args: Map<String, Value>) -> ToolOutcome {
        let args: CalculateArgs = match parse_args(args) {
            Ok(a) => a,
            Err(e) => return ToolOutcome::invalid_arguments(e),
        };
        if args.expression.chars().count() > MAX_EXPRESSION_CHARS {
            return ToolOutcome::invalid_arguments(format!(
                "expressão longa demais (máximo {MAX_EXPRESSION_CHARS} caracteres)"
            ));
        }
        match evaluate(&args.expression) {
            Ok(result) => ToolOutcome::ok(json!({
                "expression": args.expression,
                "result": result,
                "message": format!("O resultado de {} é {}", args.expression, display(result)),
            })),
            Err(e) => ToolOutcome::failed(format!(
                "Erro ao calcular '{}': {}",
                args.expression, e
            )),
        }
    }
}
