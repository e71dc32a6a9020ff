use dlg_core::DialogueError;

use crate::token::{Operator, Token};
use crate::ExprItem;

/// Shunting-yard pass: token stream in infix order to an RPN item queue.
pub fn parse_to_rpn(tokens: Vec<Token>) -> Result<Vec<ExprItem>, DialogueError> {
    let mut output = Vec::with_capacity(tokens.len());
    let mut stack: Vec<Operator> = Vec::new();

    for token in tokens {
        match token {
            Token::Operand(value) => output.push(ExprItem::Operand(value)),
            Token::Operator(Operator::LeftParen) => stack.push(Operator::LeftParen),
            Token::Operator(Operator::RightParen) => loop {
                match stack.pop() {
                    Some(Operator::LeftParen) => break,
                    Some(operator) => output.push(ExprItem::Operator(operator)),
                    None => {
                        return Err(DialogueError::new(
                            "EXPR_UNMATCHED_PAREN",
                            "Closing parenthesis without a matching open.",
                        ))
                    }
                }
            },
            Token::Operator(incoming) => {
                while let Some(&top) = stack.last() {
                    if top == Operator::LeftParen {
                        break;
                    }
                    let pops = top.precedence() < incoming.precedence()
                        || (top.precedence() == incoming.precedence()
                            && incoming.is_left_associative());
                    if !pops {
                        break;
                    }
                    stack.pop();
                    output.push(ExprItem::Operator(top));
                }
                stack.push(incoming);
            }
        }
    }

    while let Some(operator) = stack.pop() {
        if operator == Operator::LeftParen {
            return Err(DialogueError::new(
                "EXPR_UNMATCHED_PAREN",
                "Opening parenthesis without a matching close.",
            ));
        }
        output.push(ExprItem::Operator(operator));
    }

    Ok(output)
}

/// Dry-runs the RPN queue with placeholder operands, rejecting arity
/// mismatches without needing any runtime state.
pub fn validate_rpn(items: &[ExprItem]) -> Result<(), DialogueError> {
    let mut depth = 0usize;
    for item in items {
        match item {
            ExprItem::Operand(_) => depth += 1,
            ExprItem::Operator(operator) => {
                let needed = if operator.is_unary() { 1 } else { 2 };
                if depth < needed {
                    return Err(DialogueError::new(
                        "EXPR_MALFORMED",
                        "Operator is missing an operand.",
                    ));
                }
                depth = depth - needed + 1;
            }
        }
    }
    if depth != 1 {
        return Err(DialogueError::new(
            "EXPR_MALFORMED",
            "Expression does not reduce to a single value.",
        ));
    }
    Ok(())
}
