//! Basic-block graph over a function body.
//!
//! Blocks borrow their statements from the AST; the graph lives only as long
//! as the enclosing analysis pass. Ids are stable strings (`fn_entry`,
//! `if_then_3`, `while_head_5`) so trace output and tests can name blocks.
//!
//! The builder splits at structured control flow only. `GOTO` targets are
//! not wired as edges; a conservative fallthrough edge keeps liveness sound
//! for the label-free programs the lowering passes produce.

use core_ast::{RepeatMode, Statement};

#[derive(Debug)]
pub struct BasicBlock<'a> {
    pub id: String,
    pub statements: Vec<&'a Statement>,
    pub successors: Vec<String>,
}

#[derive(Debug)]
pub struct Cfg<'a> {
    pub function: String,
    pub blocks: Vec<BasicBlock<'a>>,
}

impl<'a> Cfg<'a> {
    pub fn build(function: &str, body: &'a Statement) -> Cfg<'a> {
        let mut b = Builder {
            blocks: Vec::new(),
            current: usize::MAX,
            next_id: 0,
        };
        let entry = b.new_block(format!("{function}_entry"));
        b.current = entry;
        let _trailing = b.lower(body);
        Cfg {
            function: function.to_string(),
            blocks: b.blocks,
        }
    }

    pub fn block(&self, id: &str) -> Option<&BasicBlock<'a>> {
        self.blocks.iter().find(|b| b.id == id)
    }
}

struct Builder<'a> {
    blocks: Vec<BasicBlock<'a>>,
    current: usize,
    next_id: u32,
}

impl<'a> Builder<'a> {
    fn new_block(&mut self, id: String) -> usize {
        self.blocks.push(BasicBlock {
            id,
            statements: Vec::new(),
            successors: Vec::new(),
        });
        self.blocks.len() - 1
    }

    fn fresh(&mut self, kind: &str) -> usize {
        let n = self.next_id;
        self.next_id += 1;
        self.new_block(format!("{kind}_{n}"))
    }

    fn link(&mut self, from: usize, to: usize) {
        let id = self.blocks[to].id.clone();
        if !self.blocks[from].successors.contains(&id) {
            self.blocks[from].successors.push(id);
        }
    }

    fn push_stmt(&mut self, s: &'a Statement) {
        let cur = self.current;
        self.blocks[cur].statements.push(s);
    }

    /// Lower one statement into the graph; returns the index of the block
    /// control falls through to afterwards.
    fn lower(&mut self, s: &'a Statement) -> usize {
        match s {
            Statement::Compound(stmts) => {
                for st in stmts {
                    let next = self.lower(st);
                    self.current = next;
                }
                self.current
            }
            Statement::Block { statements, .. } => {
                for st in statements {
                    let next = self.lower(st);
                    self.current = next;
                }
                self.current
            }
            Statement::If { then_branch, .. } | Statement::Unless { then_branch, .. } => {
                self.push_stmt(s);
                let head = self.current;
                let then_b = self.fresh("if_then");
                let join = self.fresh("if_join");
                self.link(head, then_b);
                self.link(head, join);
                self.current = then_b;
                let then_end = self.lower(then_branch);
                self.link(then_end, join);
                join
            }
            Statement::Test {
                then_branch,
                else_branch,
                ..
            } => {
                self.push_stmt(s);
                let head = self.current;
                let then_b = self.fresh("test_then");
                let else_b = self.fresh("test_else");
                let join = self.fresh("test_join");
                self.link(head, then_b);
                self.link(head, else_b);
                self.current = then_b;
                let then_end = self.lower(then_branch);
                self.link(then_end, join);
                self.current = else_b;
                let else_end = self.lower(else_branch);
                self.link(else_end, join);
                join
            }
            Statement::While { body, .. } | Statement::Until { body, .. } => {
                let pred = self.current;
                let head = self.fresh("loop_head");
                let body_b = self.fresh("loop_body");
                let exit = self.fresh("loop_exit");
                self.link(pred, head);
                self.current = head;
                self.push_stmt(s);
                self.link(head, body_b);
                self.link(head, exit);
                self.current = body_b;
                let body_end = self.lower(body);
                self.link(body_end, head);
                exit
            }
            Statement::Repeat { body, mode } => {
                let pred = self.current;
                let body_b = self.fresh("repeat_body");
                let exit = self.fresh("repeat_exit");
                self.link(pred, body_b);
                self.current = body_b;
                self.push_stmt(s);
                let body_end = self.lower(body);
                self.link(body_end, body_b);
                match mode {
                    RepeatMode::Forever => {}
                    RepeatMode::While(_) | RepeatMode::Until(_) => {
                        self.link(body_end, exit);
                    }
                }
                exit
            }
            Statement::For { body, .. } | Statement::ForEach { body, .. } => {
                let pred = self.current;
                let head = self.fresh("for_head");
                let body_b = self.fresh("for_body");
                let exit = self.fresh("for_exit");
                self.link(pred, head);
                self.current = head;
                self.push_stmt(s);
                self.link(head, body_b);
                self.link(head, exit);
                self.current = body_b;
                let body_end = self.lower(body);
                self.link(body_end, head);
                exit
            }
            Statement::Switchon { body, .. } => {
                self.push_stmt(s);
                let head = self.current;
                let body_b = self.fresh("switch_body");
                let exit = self.fresh("switch_exit");
                self.link(head, body_b);
                self.link(head, exit);
                self.current = body_b;
                let end = self.lower(body);
                self.link(end, exit);
                exit
            }
            Statement::Case { body, .. } | Statement::Default { body } => {
                self.push_stmt(s);
                let head = self.current;
                let arm = self.fresh("case_arm");
                self.link(head, arm);
                self.current = arm;
                let end = self.lower(body);
                let next = self.fresh("case_next");
                self.link(end, next);
                self.link(head, next);
                next
            }
            Statement::Defer(inner) => {
                // The deferred action runs on scope exit; for liveness it is
                // enough to see its uses in the current block.
                self.push_stmt(inner);
                self.current
            }
            Statement::Return
            | Statement::Resultis { .. }
            | Statement::Finish { .. }
            | Statement::Goto(_) => {
                self.push_stmt(s);
                // No fallthrough edge; trailing statements start fresh.
                self.fresh("unreachable")
            }
            _ => {
                self.push_stmt(s);
                self.current
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_ast::Expression;

    #[test]
    fn test_statement_creates_diamond() {
        let body = Statement::Compound(vec![Statement::Test {
            condition: Expression::variable("c"),
            then_branch: Box::new(Statement::RoutineCall(Expression::call("F", vec![]))),
            else_branch: Box::new(Statement::RoutineCall(Expression::call("G", vec![]))),
        }]);
        let cfg = Cfg::build("fn", &body);
        let entry = cfg.block("fn_entry").unwrap();
        assert_eq!(entry.successors.len(), 2);
        assert!(entry.successors.iter().any(|s| s.starts_with("test_then")));
        assert!(entry.successors.iter().any(|s| s.starts_with("test_else")));
    }

    #[test]
    fn while_loop_has_back_edge() {
        let body = Statement::While {
            condition: Expression::variable("c"),
            body: Box::new(Statement::RoutineCall(Expression::call("F", vec![]))),
        };
        let cfg = Cfg::build("fn", &body);
        let head_id = cfg
            .blocks
            .iter()
            .find(|b| b.id.starts_with("loop_head"))
            .unwrap()
            .id
            .clone();
        let body_block = cfg
            .blocks
            .iter()
            .find(|b| b.id.starts_with("loop_body"))
            .unwrap();
        assert!(body_block.successors.contains(&head_id));
    }
}
